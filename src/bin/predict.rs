//! One-shot predictor: score a single race entry with trained models.

use anyhow::{Context, Result};
use clap::Parser;
use std::{io::Read, path::PathBuf};

use race_predictor::{report, Predictor, RaceEntryInput, Target, DEFAULT_LOG_FILTER};

#[derive(Parser, Debug)]
#[command(name = "predict")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Predict race outcomes for one driver entry", long_about = None)]
struct Args {
    /// JSON object with the entry's fields; reads stdin when omitted
    entry: Option<PathBuf>,

    /// Directory holding feature_info.json and the model bundles
    #[arg(short, long, env = "MODEL_DIR", default_value = "output")]
    model_dir: PathBuf,

    /// Targets to score (default: the four served targets)
    #[arg(short, long, value_delimiter = ',')]
    targets: Vec<Target>,

    /// Print the raw JSON result instead of the ranked report
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw = match &args.entry {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read entry from stdin")?;
            buf
        }
    };
    let entry: RaceEntryInput =
        serde_json::from_str(&raw).context("entry must be a JSON object")?;

    let targets = if args.targets.is_empty() {
        Target::SERVED.to_vec()
    } else {
        args.targets.clone()
    };
    let predictor = Predictor::new();
    predictor
        .load_from_dir(&args.model_dir, &targets)
        .with_context(|| format!("failed to load models from {}", args.model_dir.display()))?;

    let result = predictor.predict(&entry)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", report::render(&result));
    }
    Ok(())
}
