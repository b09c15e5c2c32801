//! Command-line pass@1 scorer.
//!
//! Loads a reference problem CSV and a prediction JSON file, scores
//! every prediction against its assertions in a deadline-bounded worker
//! process, prints the summary block, and optionally writes the
//! machine-readable accuracy record.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use passbench_core::{AppConfig, PassbenchError};
use passbench_eval::datasets::{load_predictions, load_reference, merge};
use passbench_eval::{EvalConfig, Evaluator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "passbench")]
#[command(about = "Score model-generated Python solutions against reference assertions", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the reference problem CSV (id, test_list columns)
    #[arg(short, long)]
    reference: PathBuf,

    /// Path to the prediction JSON file (list of records or id mapping)
    #[arg(short, long)]
    predictions: PathBuf,

    /// Write the accuracy record to this path
    #[arg(short, long)]
    scores: Option<PathBuf>,

    /// Per-step execution deadline in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Python interpreter command
    #[arg(long)]
    python: Option<String>,

    /// Load defaults from a TOML config file (explicit flags win)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Score only the first N entries
    #[arg(short, long)]
    limit: Option<usize>,
}

/// Reads the log level from RUST_LOG (defaults to "info"), writes to
/// stderr so the summary block on stdout stays clean.
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<PassbenchError>() {
            Some(inner) if inner.is_data_error() => {
                eprintln!("{} {}", "Input error:".red(), inner);
                eprintln!(
                    "{}",
                    "Check the reference CSV columns (id, test_list) and that the predictions file is valid JSON."
                        .dimmed()
                );
            }
            _ => {
                eprintln!("{} {:#}", "Error:".red(), e);
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file_config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    let eval_config = resolve_eval_config(&cli, &file_config);
    let scores_path = resolve_scores_path(&cli, &file_config);

    println!("{} {}", "Reference:".cyan(), cli.reference.display());
    println!("{} {}", "Predictions:".cyan(), cli.predictions.display());

    let reference = load_reference(&cli.reference)?;
    let predictions = load_predictions(&cli.predictions)?;
    println!(
        "{} {} problems, {} predictions",
        "Loaded:".cyan(),
        reference.len(),
        predictions.len()
    );

    let entries = merge(&reference, &predictions);
    let report = Evaluator::new(eval_config).evaluate(&entries).await;
    report.print_summary();

    if let Some(path) = scores_path {
        report
            .save_scores(&path)
            .with_context(|| format!("writing scores to {}", path.display()))?;
        println!("{} scores written to {}", "✓".green(), path.display());
    }

    Ok(())
}

/// Explicit flags win over the config file; the config file wins over
/// built-in defaults.
fn resolve_eval_config(cli: &Cli, file: &AppConfig) -> EvalConfig {
    EvalConfig {
        python_cmd: cli
            .python
            .clone()
            .unwrap_or_else(|| file.execution.python_cmd.clone()),
        timeout_secs: cli.timeout.unwrap_or(file.execution.timeout_secs),
        max_entries: cli.limit,
    }
}

fn resolve_scores_path(cli: &Cli, file: &AppConfig) -> Option<PathBuf> {
    cli.scores
        .clone()
        .or_else(|| file.report.scores_path.as_ref().map(PathBuf::from))
}
