use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use pyscan_core::cache::HashMode;
use pyscan_core::{run, RunOptions, RunOutcome};

/// static-pyscan - static call-graph extractor for Python source trees
#[derive(Parser)]
#[command(name = "static-pyscan")]
#[command(version)]
#[command(about = "Walk a Python tree and emit a structured call-graph report", long_about = None)]
struct Cli {
    /// Scan root
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Write the report JSON here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Skip files larger than this many bytes
    #[arg(long, default_value_t = 1_000_000)]
    max_file_size: u64,

    /// Parallel parsing degree
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Directory basename to exclude; repeatable
    #[arg(long = "skip-dir")]
    skip_dir: Vec<String>,

    /// Read and write an incremental cache at this path
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Fingerprint mode for incremental caching
    #[arg(long, default_value = "stat")]
    hash_mode: String,

    /// Drop unresolved entries whose name is a runtime built-in
    #[arg(long)]
    ignore_builtin_unresolved: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(root = %cli.root.display(), workers = cli.workers, "starting scan");

    let hash_mode: HashMode = cli
        .hash_mode
        .parse()
        .with_context(|| format!("invalid --hash-mode {:?}", cli.hash_mode))?;

    let edge_cap = std::env::var("CRV_PY_EDGE_CAP")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|c| *c > 0);

    let out_path = cli.out.clone();
    let opts = RunOptions {
        root: cli.root,
        max_file_size: cli.max_file_size,
        workers: cli.workers,
        skip_dirs: cli.skip_dir,
        cache_file: cli.cache_file,
        hash_mode,
        ignore_builtin_unresolved: cli.ignore_builtin_unresolved,
        edge_cap,
    };

    let generated_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let RunOutcome { report, stats } = run(&opts, generated_at).context("scan failed")?;
    tracing::info!(files = stats.files, edges = stats.edges, "scan complete");

    let rendered = pyscan_core::report::to_string_pretty(&report);
    match out_path {
        Some(path) => fs::write(&path, rendered)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => println!("{}", rendered),
    }

    eprintln!(
        "PYSCAN_STATS files={} functions={} edges={} unresolved={} reused_files={} parsed_files={} resolved_cross={} imported_resolved={} imported_missing={} ignored_builtins={} pruned={}",
        stats.files,
        stats.functions,
        stats.edges,
        stats.unresolved,
        stats.reused_files,
        stats.parsed_files,
        stats.resolved_cross,
        stats.imported_resolved,
        stats.imported_missing,
        stats.ignored_builtins,
        stats.pruned,
    );

    if let Ok(debug) = std::env::var("CRV_DEBUG") {
        if debug.contains("pyscan") {
            let extra = serde_json::json!({
                "debug": "pyscan",
                "files": stats.files,
                "edges": stats.edges,
            });
            eprintln!("{}", extra);
        }
    }

    Ok(())
}
