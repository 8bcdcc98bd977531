//! filesorter - Sort files into folders named after their extensions.
//!
//! Usage:
//!   filesorter -s SOURCE -d DEST          Sort files directly under SOURCE
//!   filesorter -s SOURCE -d DEST -r       Include all subdirectories
//!   filesorter --help                     Show help

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use filesorter_core::{SortConfig, SortSummary, default_concurrency};
use filesorter_ops::Sorter;

#[derive(Parser)]
#[command(
    name = "filesorter",
    version,
    about = "Sort files into folders named after their extensions",
    long_about = "filesorter copies every file from a source folder into a subfolder of \
                  the destination named after the file's extension (or `no_extension`). \
                  Copies run concurrently and never overwrite each other: clashing names \
                  get a numeric suffix."
)]
struct Cli {
    /// Source folder with files
    #[arg(short, long)]
    source: PathBuf,

    /// Destination folder for sorted files
    #[arg(short, long)]
    destination: PathBuf,

    /// Process subfolders recursively
    #[arg(short, long)]
    recursive: bool,

    /// Number of copies to run at once
    #[arg(short = 'j', long, default_value_t = default_concurrency())]
    jobs: usize,

    /// Threads used to read source directories (0 = single thread)
    #[arg(long, default_value = "0")]
    walk_threads: usize,

    /// Do not copy modification times onto sorted files
    #[arg(long)]
    no_preserve_timestamps: bool,

    /// Interrupt copies that are already running when cancelled (Ctrl-C)
    #[arg(long)]
    abort_in_flight: bool,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output format for the final summary
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Log every decision, not just outcomes
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = SortConfig::builder()
        .source_root(cli.source)
        .destination_root(cli.destination)
        .recursive(cli.recursive)
        .concurrency(cli.jobs)
        .walk_threads(cli.walk_threads)
        .preserve_timestamps(!cli.no_preserve_timestamps)
        .abort_in_flight_on_cancel(cli.abort_in_flight)
        .build()
        .wrap_err("Invalid configuration")?;

    let sorter = Sorter::new(config);

    let token = sorter.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, no new files will be started");
            token.cancel();
        }
    });

    let summary = sorter.run().await.wrap_err("Sorting failed")?;

    match cli.format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}

/// Install the tracing subscriber: stderr, plus an optional log file.
fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_filter = if verbose {
        "filesorter=debug,warn"
    } else {
        "filesorter=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("Cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    Ok(())
}

/// Print the run summary.
fn print_summary(summary: &SortSummary) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", summary.summary());
    println!(
        " {} files, {} copied",
        summary.total,
        format_size(summary.bytes_copied)
    );
    println!("{}", "─".repeat(60));

    if !summary.failures.is_empty() {
        println!();
        println!(" Failed:");
        for failure in &summary.failures {
            println!("   {}: {}", failure.source.display(), failure.reason);
        }
    }

    if !summary.traversal_errors.is_empty() {
        println!();
        println!(" Skipped:");
        for err in &summary.traversal_errors {
            println!("   {err}");
        }
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
