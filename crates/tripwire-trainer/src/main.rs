//! CLI entry point for the scam-classifier trainer.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tripwire_trainer::{
    DEFAULT_MODEL_DIR, StorageRouter, Trainer, TrainerConfig, TrainingOutcome,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Train the tripwire scam classifier",
    long_about = "Train a TF-IDF + gradient-boosted-tree scam classifier from a labeled CSV corpus \
                  and publish model.bst, tfidf_vocab.json and metadata.json.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  AIP_TRAINING_DATA_URI       Corpus location when --data-path is not given\n  \
                  AIP_MODEL_DIR               Output location when --model-dir is not given\n  \
                  GOOGLE_OAUTH_ACCESS_TOKEN   Bearer token for gs:// locations\n  \
                  STORAGE_EMULATOR_HOST       Alternative GCS endpoint\n\n\
                  EXAMPLES:\n  \
                  # Train from a local export\n  \
                  tripwire-train --data-path data/spam_converted.csv --model-dir out/\n\n  \
                  # Keep the feature space of a previous bundle\n  \
                  tripwire-train --data-path gs://corpus/exports/ \\\n    \
                  --vocabulary-path gs://models/v3/tfidf_vocab.json"
)]
struct Args {
    /// Corpus CSV, or a directory holding one (local path or gs:// URI)
    #[arg(long, alias = "data_path", env = "AIP_TRAINING_DATA_URI")]
    data_path: Option<String>,

    /// Column holding the message text
    #[arg(long, alias = "text_column", default_value = "text")]
    text_column: String,

    /// Column holding the raw label
    #[arg(long, alias = "label_column", default_value = "label")]
    label_column: String,

    /// Case-insensitive regex marking the positive (SCAM) class
    #[arg(long, alias = "pos_regex", default_value = tripwire_features::DEFAULT_POSITIVE_PATTERN)]
    pos_regex: String,

    /// Vocabulary cap when learning a vocabulary
    #[arg(long, alias = "max_features", default_value = "5000")]
    max_features: usize,

    /// Smallest n-gram length
    #[arg(long, alias = "ngram_min", default_value = "1")]
    ngram_min: usize,

    /// Largest n-gram length
    #[arg(long, alias = "ngram_max", default_value = "2")]
    ngram_max: usize,

    /// Minimum number of training documents a term must appear in
    #[arg(long, alias = "min_df", default_value = "2")]
    min_df: usize,

    /// Persisted vocabulary to lock the feature space to
    ///
    /// Accepts the vocabulary document of an earlier bundle or a bare
    /// {term: index} mapping.
    #[arg(long, alias = "vocabulary_path")]
    vocabulary_path: Option<String>,

    /// Where the bundle is published (local path or gs:// URI)
    #[arg(long, alias = "model_dir", env = "AIP_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    model_dir: String,

    /// F1 below this logs a warning; the run still succeeds
    #[arg(long, alias = "f1_warning_threshold", default_value = "0.80")]
    f1_warning_threshold: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> tripwire_trainer::TrainingResult<TrainerConfig> {
    let mut builder = TrainerConfig::builder()
        .model_dir(&args.model_dir)
        .text_column(&args.text_column)
        .label_column(&args.label_column)
        .pos_regex(&args.pos_regex)
        .max_features(args.max_features)
        .ngram_range(args.ngram_min, args.ngram_max)
        .min_df(args.min_df)
        .f1_warning_threshold(args.f1_warning_threshold);

    if let Some(ref path) = args.data_path {
        builder = builder.data_path(path);
    }
    if let Some(ref path) = args.vocabulary_path {
        builder = builder.vocabulary_path(path);
    }

    Ok(builder.build()?)
}

fn run(args: &Args) -> tripwire_trainer::TrainingResult<TrainingOutcome> {
    let config = build_config(args)?;
    info!("Corpus: {}", config.data_path);
    let storage = StorageRouter::new()?;
    Trainer::new(config, Box::new(storage)).run()
}

fn main() -> Result<()> {
    // Load environment variables before clap reads the env fallbacks
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level);

    match run(&args) {
        Ok(outcome) => {
            for location in &outcome.published {
                info!("Published {}", location);
            }
            info!(
                "Training complete: f1={:.4} precision={:.4} recall={:.4} vec_dim={}",
                outcome.artifacts.evaluation.f1,
                outcome.artifacts.evaluation.precision,
                outcome.artifacts.evaluation.recall,
                outcome.artifacts.metadata.vec_dim
            );
            Ok(())
        }
        Err(e) => {
            error!("[{}] {}", e.error_code(), e);
            Err(anyhow!("[{}] {}", e.error_code(), e))
        }
    }
}
