//! Bronze to processed: join raw race and qualifying results into the
//! training CSV.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use race_predictor::{process, DEFAULT_LOG_FILTER};

#[derive(Parser, Debug)]
#[command(name = "process")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build the processed results CSV from bronze race and qualifying data", long_about = None)]
struct Args {
    /// Raw race results, one row per driver per race
    #[arg(long, default_value = process::DEFAULT_RACE_BRONZE)]
    race: PathBuf,

    /// Raw qualifying results, one row per driver per race
    #[arg(long, default_value = process::DEFAULT_QUALIFYING_BRONZE)]
    qualifying: PathBuf,

    /// Where to write the processed CSV
    #[arg(short, long, default_value = process::DEFAULT_PROCESSED)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_target(false)
        .init();

    info!("Processing bronze data");
    info!("  Race results: {}", args.race.display());
    info!("  Qualifying results: {}", args.qualifying.display());

    let table = process::process_bronze(&args.race, &args.qualifying, &args.output)
        .with_context(|| format!("failed to build {}", args.output.display()))?;

    info!("✓ {} rows, {} columns", table.len(), table.header.len());
    info!("Processed data written to {}", args.output.display());
    Ok(())
}
