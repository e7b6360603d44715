//! telemetry-index - inspect a telemetry dataset from the command line.
//!
//! Every invocation scans `ROOT` first; the index lives only for the process.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use telemetry_index::{
    extract_series, load_full, measurement_paths, DatasetIndex, FolderIdPattern, ScanOptions,
    Scanner,
};
use tracing::info;

/// Command-line arguments for telemetry-index
#[derive(Parser, Debug)]
#[command(name = "telemetry-index")]
#[command(about = "Index IoT telemetry by device and extract measurement series")]
#[command(version)]
struct Args {
    /// Dataset root directory
    #[arg(env = "TELEMETRY_INDEX_ROOT")]
    root: PathBuf,

    /// Sample records cached per device
    #[arg(long, default_value_t = 1)]
    samples: usize,

    /// Stop scanning after this many files
    #[arg(long)]
    max_files: Option<usize>,

    /// Follow symbolic links while scanning
    #[arg(long)]
    follow_links: bool,

    /// Only accept 16-hex-character folder names as device ids
    #[arg(long)]
    strict_eui: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices found by a lightweight scan
    Scan,
    /// Fully load one device and summarize its records
    Load {
        /// Device key as printed by `scan`
        key: String,
    },
    /// List measurement paths for one device
    Paths {
        /// Device key as printed by `scan`
        key: String,
    },
    /// Print the time/value series of one measurement path
    Series {
        /// Device key as printed by `scan`
        key: String,
        /// Dot-separated measurement path, e.g. rxInfo.rssi
        path: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut options = ScanOptions::new()
        .with_sample_per_device(args.samples)
        .with_follow_links(args.follow_links);
    if let Some(n) = args.max_files {
        options = options.with_max_files(n);
    }
    if args.strict_eui {
        options = options.with_folder_id_pattern(FolderIdPattern::Eui64);
    }

    let index = Scanner::new(options)?
        .scan(&args.root)
        .with_context(|| format!("scan {}", args.root.display()))?;
    info!(
        "Loaded {} files from: {}",
        index.touched_files().len(),
        args.root.display()
    );
    info!("Found {} devices in data.", index.len());

    match &args.command {
        Command::Scan => print_scan(&index, args.json),
        Command::Load { key } => {
            let load = load_full(key, &index)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&load)?);
            } else {
                println!(
                    "{key}: {} records from {} files ({} files skipped, {} lines skipped)",
                    load.records.len(),
                    load.report.files_loaded.len(),
                    load.report.files_skipped.len(),
                    load.report.lines_skipped
                );
                for (path, reason) in &load.report.files_skipped {
                    println!("  skipped {}: {reason}", path.display());
                }
                for (path, reason) in &load.report.files_truncated {
                    println!("  truncated {}: {reason}", path.display());
                }
            }
            Ok(())
        }
        Command::Paths { key } => {
            let load = load_full(key, &index)?;
            let paths = measurement_paths(&load.records);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else {
                for p in paths {
                    println!("{p}");
                }
            }
            Ok(())
        }
        Command::Series { key, path } => {
            let load = load_full(key, &index)?;
            let series = extract_series(&load.records, path);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                println!("time,value");
                for p in &series.points {
                    println!("{},{}", p.time.to_rfc3339(), p.value);
                }
                if series.is_empty() {
                    eprintln!("no plottable data for {key} - {path}");
                }
            }
            Ok(())
        }
    }
}

fn print_scan(index: &DatasetIndex, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(index)?);
        return Ok(());
    }
    for (key, entry) in index.devices() {
        println!(
            "{}\t{} files\t{}",
            entry.label(key),
            entry.files.len(),
            entry.source
        );
    }
    let stats = index.stats();
    println!(
        "-- {} devices, {} files inspected, {} skipped, {} without records",
        index.len(),
        stats.inspected,
        stats.skipped,
        stats.without_record
    );
    Ok(())
}
