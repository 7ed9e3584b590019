//! Ledger script runner binary

use anyhow::Context;
use block_ledger::{Config, ScriptSession};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledger-cli")]
#[command(about = "Run a block ledger command script", long_about = None)]
struct Cli {
    /// Script file (reads stdin when omitted)
    script: Option<PathBuf>,

    /// Config file path (falls back to LEDGER_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print one JSON object per command
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the script finishes
    #[arg(long)]
    metrics: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env().context("failed to load config from environment")?,
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    if cli.log_json || config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!("Starting {}", config.service_name);

    let mut session = ScriptSession::new(config.ledger.clone());
    let reports = match &cli.script {
        Some(path) => session
            .run_file(path)
            .with_context(|| format!("failed to run script {}", path.display()))?,
        None => session
            .run(std::io::stdin().lock())
            .context("failed to read script from stdin")?,
    };

    let failures = reports.iter().filter(|r| r.result.is_err()).count();
    for report in &reports {
        if cli.json {
            println!("{}", report.to_json());
        } else {
            println!("{}", report.command);
            println!("{}", report);
            println!();
        }
    }

    if cli.metrics {
        if let Some(ledger) = session.ledger() {
            print!("{}", ledger.metrics().render());
        }
    }

    tracing::info!(
        "Script finished: {} commands, {} failed",
        reports.len(),
        failures
    );
    Ok(())
}
