//! Offline trainer: one scaler + classifier bundle per race outcome.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use race_predictor::{
    gbdt::GbdtConfig,
    logistic::LogisticConfig,
    trainer::{Trainer, TrainingConfig},
    ModelKind, Target, DEFAULT_LOG_FILTER,
};

#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train race outcome classifiers from processed results", long_about = None)]
struct Args {
    /// Processed results CSV (one row per driver per race)
    #[arg(short, long, default_value = race_predictor::process::DEFAULT_PROCESSED)]
    input: PathBuf,

    /// Output directory for the contract, bundles and diagnostics
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Targets to train, by label or stem (default: all)
    #[arg(short, long, value_delimiter = ',')]
    targets: Vec<Target>,

    /// Candidate model kinds, in tie-break order (default: logistic, gbdt)
    #[arg(short, long, value_delimiter = ',')]
    models: Vec<ModelKind>,

    /// Share of rows held out for evaluation
    #[arg(long, default_value = "0.2")]
    test_fraction: f64,

    /// Seed for the train/test shuffle
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of boosting trees
    #[arg(long, default_value = "100")]
    trees: usize,

    /// Maximum tree depth
    #[arg(long, default_value = "5")]
    max_depth: usize,

    /// Minimum samples per leaf
    #[arg(long, default_value = "20")]
    min_samples_leaf: usize,

    /// Boosting learning rate
    #[arg(long, default_value = "0.1")]
    learning_rate: f64,

    /// Gradient descent iterations for logistic regression
    #[arg(long, default_value = "500")]
    iterations: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "race_predictor=debug,train=debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .init();

    if !(0.0..1.0).contains(&args.test_fraction) {
        bail!("--test-fraction must be in [0, 1), got {}", args.test_fraction);
    }

    info!("Race outcome trainer v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════");

    let mut config = TrainingConfig::new(&args.input, &args.output);
    if !args.targets.is_empty() {
        config.targets = args.targets.clone();
    }
    if !args.models.is_empty() {
        config.model_kinds = args.models.clone();
    }
    config.test_fraction = args.test_fraction;
    config.seed = args.seed;
    config.gbdt = GbdtConfig {
        num_trees: args.trees,
        max_depth: args.max_depth,
        min_samples_leaf: args.min_samples_leaf,
        learning_rate: args.learning_rate,
        ..GbdtConfig::default()
    };
    config.logistic = LogisticConfig {
        iterations: args.iterations,
        ..LogisticConfig::default()
    };

    info!("Training configuration:");
    info!("  Targets: {:?}", config.targets.iter().map(|t| t.label()).collect::<Vec<_>>());
    info!("  Models: {:?}", config.model_kinds.iter().map(|m| m.name()).collect::<Vec<_>>());
    info!("  Test fraction: {}", config.test_fraction);
    info!("  Seed: {}", config.seed);
    info!("  Trees: {} (depth {}, min leaf {})", config.gbdt.num_trees, config.gbdt.max_depth, config.gbdt.min_samples_leaf);

    let report = Trainer::new(config)
        .run()
        .with_context(|| format!("training from {} failed", args.input.display()))?;

    info!("═══════════════════════════════════════════");
    for outcome in &report.trained {
        let best = outcome
            .results
            .iter()
            .find(|r| r.model == outcome.chosen)
            .map_or(0.0, |r| r.accuracy);
        info!("✓ {}: {} (accuracy {:.4})", outcome.target, outcome.chosen, best);
    }
    for (target, reason) in &report.failed {
        info!("✗ {}: {}", target, reason);
    }
    info!("Artifacts written to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_processed_data_by_default() {
        let args = Args::parse_from(["train"]);
        assert_eq!(args.input, PathBuf::from("data/csv/f1_processed_data.csv"));
        assert_eq!(args.output, PathBuf::from("output"));
        assert!(args.targets.is_empty());
    }
}
