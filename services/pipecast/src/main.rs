//! Pipecast batch runner.
//!
//! Extracts precipitation AOIs for every configured (date, hour, member),
//! aggregates them into ensemble probability rasters and writes a
//! population-weighted risk ranking.
//!
//! Exit status: 0 on success, 1 when any failure was recorded, 2 when the
//! configuration is invalid.

use clap::Parser;
use pipecast::{load_config, Pipeline, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "pipecast")]
#[command(about = "Precipitation AOI extraction, ensemble probability and risk ranking")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PIPECAST_CONFIG", default_value = "config/pipecast.yaml")]
    config: PathBuf,

    /// Override the configured output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Override the number of tuples processed concurrently
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }

    info!(config = %args.config.display(), "Starting pipecast");

    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Invalid configuration");
            return ExitCode::from(2);
        }
    };
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(n) = args.max_concurrent {
        if n == 0 {
            error!("--max-concurrent must be at least 1");
            return ExitCode::from(2);
        }
        config.max_concurrent_tuples = n;
    }

    info!(
        dates = config.dates.len(),
        hours = config.forecast_hours.len(),
        members = config.members.len(),
        thresholds = config.thresholds.len(),
        layers = config.layers.len(),
        output = %config.output_dir.display(),
        "Loaded configuration"
    );

    let pipeline = match Pipeline::from_config(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Invalid configuration");
            return ExitCode::from(2);
        }
    };

    match pipeline.run().await {
        Ok(summary) => {
            report(&summary);
            if summary.has_failures() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Run aborted");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    info!(
        tuples = summary.tuples,
        failed_tuples = summary.failed_tuples,
        rasters = summary.rasters,
        ranked = summary.ranked,
        artifacts = summary.manifest.artifacts.len(),
        "Summary"
    );
    for failure in &summary.manifest.failures {
        warn!(
            scope = %failure.scope,
            category = %failure.category,
            reason = %failure.reason,
            "Failure"
        );
    }
}
