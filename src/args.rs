use anyhow::{bail, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Compute percentiles over JSON documents; every input file is one worker partition")]
pub struct Args {
    /// JSON or JSON-lines file, or a directory scanned for *.json / *.jsonl
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Full statement, e.g. '{"$percentile": {"p": [0.5], "input": "$x", "method": "discrete"}}'
    #[arg(long = "spec", conflicts_with_all = ["field", "p", "median"])]
    pub spec: Option<String>,

    /// Field to aggregate (with or without the leading '$')
    #[arg(short = 'f', long = "field")]
    pub field: Option<String>,

    /// Comma separated fractions in [0.0, 1.0]
    #[arg(short = 'p', long = "p", value_delimiter = ',')]
    pub p: Vec<f64>,

    /// approximate, discrete or continuous
    #[arg(short = 'm', long = "method", default_value = "approximate")]
    pub method: String,

    /// Report the median instead of a list of percentiles
    #[arg(long = "median")]
    pub median: bool,

    /// Field to group by; all documents form one group when omitted
    #[arg(short = 'g', long = "group-by")]
    pub group_by: Option<String>,

    /// Per-accumulator memory budget in bytes
    #[arg(long = "max-memory-bytes")]
    pub max_memory_bytes: Option<usize>,

    /// Centroids kept by approximate sketches; lower is smaller and coarser
    #[arg(long = "max-centroids")]
    pub max_centroids: Option<usize>,

    /// Only allow the approximate method
    #[arg(long = "no-accurate")]
    pub no_accurate: bool,

    /// JSON file with accumulator settings
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Worker threads used to evaluate partitions
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,

    /// Print the per-partition partial states as JSON lines instead of results
    #[arg(long = "emit-partials", conflicts_with = "per_document")]
    pub emit_partials: bool,

    /// Evaluate the statement within each document (array inputs) and print one JSON line per document
    #[arg(long = "per-document", conflicts_with = "group_by")]
    pub per_document: bool,
}

impl Args {
    /// The declarative statement described by the arguments.
    pub fn statement_json(&self) -> Result<serde_json::Value> {
        if let Some(spec) = &self.spec {
            return Ok(serde_json::from_str(spec)?);
        }
        let Some(field) = &self.field else {
            bail!("either --spec or --field is required");
        };
        let input = format!("${}", field.trim_start_matches('$'));
        if self.median {
            return Ok(json!({"$median": {"input": input, "method": self.method}}));
        }
        if self.p.is_empty() {
            bail!("--p is required unless --median is given");
        }
        Ok(json!({"$percentile": {"p": self.p, "input": input, "method": self.method}}))
    }
}
