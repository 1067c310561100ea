mod args;
mod io_utils;
mod report;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use rayon::prelude::*;
use serde_json::json;
use std::fs;
use std::time::Instant;

use args::Args;
use io_utils::{load_documents, scan_inputs};
use percentile_accum::group::{evaluate_partitioned, partial_groups};
use percentile_accum::{AccumulatorConfig, AccumulatorStatement, Expression, Value, Variables};
use report::{add_group_rows, build_table_title};

fn load_config(args: &Args) -> Result<AccumulatorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?
        }
        None => AccumulatorConfig::from_env(),
    };
    if let Some(bytes) = args.max_memory_bytes {
        config = config.with_max_memory_bytes(bytes);
    }
    if let Some(n) = args.max_centroids {
        config = config.with_approximate_max_centroids(n);
    }
    if args.no_accurate {
        config = config.with_accurate_percentiles(false);
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let t0 = Instant::now();

    let args = Args::parse();
    if !args.input.exists() {
        return Err(anyhow!("input path not found: {}", args.input.display()));
    }
    let config = load_config(&args)?;

    if let Some(workers) = args.workers {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build_global()
            .context("configure worker pool")?;
    }

    let statement = AccumulatorStatement::parse(&args.statement_json()?, &Variables::new(), &config)?;
    let key = match &args.group_by {
        Some(field) => Expression::field_path(field)?,
        None => Expression::Constant(Value::Null),
    };

    let files = scan_inputs(&args.input)?;
    let partitions = files
        .par_iter()
        .map(|path| load_documents(path))
        .collect::<Result<Vec<_>>>()?;
    info!(
        "loaded {} documents from {} partitions in {:.3}s",
        partitions.iter().map(Vec::len).sum::<usize>(),
        partitions.len(),
        t0.elapsed().as_secs_f64()
    );

    if args.per_document {
        for docs in &partitions {
            for doc in docs {
                println!("{}", statement.evaluate_expression(doc, &config)?.to_json());
            }
        }
        return Ok(());
    }

    if args.emit_partials {
        for (path, docs) in files.iter().zip(&partitions) {
            for group in partial_groups(docs, &statement, &key, &config)? {
                let line = json!({
                    "partition": path.display().to_string(),
                    "key": group.key.to_json(),
                    "partial": group.partial.to_json()?,
                });
                println!("{}", line);
            }
        }
        return Ok(());
    }

    let t_eval = Instant::now();
    let results = evaluate_partitioned(&partitions, &statement, &key, &config)?;
    info!(
        "{} groups evaluated with {} in {:.3}s",
        results.len(),
        statement.method(),
        t_eval.elapsed().as_secs_f64()
    );

    let mut table = build_table_title(&statement);
    add_group_rows(&mut table, &results);
    table.printstd();
    Ok(())
}
