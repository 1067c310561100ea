use anyhow::{anyhow, Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use percentile_accum::value::{document_from_json, Document};

fn is_document_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(OsStr::to_str),
        Some("json") | Some("jsonl") | Some("ndjson")
    )
}

/// Input partitions under `input`, sorted by path. A plain file is a single
/// partition.
pub fn scan_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && is_document_file(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    if files.is_empty() {
        return Err(anyhow!(
            "No input documents found under: {} (expected *.json or *.jsonl files)",
            input.display()
        ));
    }
    files.sort();
    Ok(files)
}

/// Reads either a JSON array of documents or one document per line.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_documents(&text).with_context(|| format!("parse documents from {}", path.display()))
}

fn parse_documents(text: &str) -> Result<Vec<Document>> {
    if text.trim_start().starts_with('[') {
        let items: Vec<serde_json::Value> = serde_json::from_str(text)?;
        return items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                document_from_json(item).ok_or_else(|| anyhow!("element {} is not an object", i))
            })
            .collect();
    }

    let mut docs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item: serde_json::Value =
            serde_json::from_str(line).with_context(|| format!("line {}", lineno + 1))?;
        let doc = document_from_json(&item)
            .ok_or_else(|| anyhow!("line {} is not an object", lineno + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}
