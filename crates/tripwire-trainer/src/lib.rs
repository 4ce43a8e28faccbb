//! Scam-Classifier Training Library
//!
//! Turns a labeled CSV corpus into an artifact bundle that a separate serving
//! process loads: a gradient-boosted tree model, the TF-IDF vocabulary it was
//! trained against, and run metadata.
//!
//! # Overview
//!
//! - **Corpus**: resolve a CSV file or a directory export, locally or on GCS
//! - **Labels**: collapse free-text labels into SCAM/SAFE with a regex rule
//! - **Split**: seeded stratified 80/20 train/test split
//! - **Features**: learn a vocabulary, or lock to a previously persisted one
//! - **Boosting**: class-imbalance-weighted logistic boosting with early stopping
//! - **Bundle**: stage locally, then publish all three artifacts or none
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tripwire_trainer::{StorageRouter, Trainer, TrainerConfig};
//!
//! let config = TrainerConfig::builder()
//!     .data_path("gs://corpus-bucket/exports/")
//!     .model_dir("gs://model-bucket/tripwire/")
//!     .build()?;
//!
//! let outcome = Trainer::new(config, Box::new(StorageRouter::new()?)).run()?;
//! println!("F1 = {:.3}", outcome.artifacts.evaluation.f1);
//! # Ok::<(), tripwire_trainer::TrainingError>(())
//! ```
//!
//! # Locked vocabularies
//!
//! Pointing `vocabulary_path` at a `tfidf_vocab.json` from an earlier bundle
//! keeps the feature space fixed: every column keeps its index, and terms the
//! old vocabulary never saw are ignored.
//!
//! ```rust,no_run
//! use tripwire_trainer::{StorageRouter, Trainer, TrainerConfig};
//!
//! let config = TrainerConfig::builder()
//!     .data_path("/data/spam_converted.csv")
//!     .vocabulary_path("/models/previous/tfidf_vocab.json")
//!     .build()?;
//!
//! let artifacts = Trainer::new(config, Box::new(StorageRouter::new()?)).train()?;
//! assert_eq!(artifacts.metadata.vec_dim, artifacts.vocabulary.vocabulary.len());
//! # Ok::<(), tripwire_trainer::TrainingError>(())
//! ```

pub mod booster;
pub mod bundle;
pub mod config;
pub mod corpus;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod split;
pub mod storage;

// Re-exports for convenient access
pub use booster::{Booster, BoosterParams, LabeledMatrix};
pub use bundle::{
    ARTIFACT_FILES, ArtifactBundle, BundleMetadata, LoadedBundle, METADATA_FILE, MODEL_FILE,
    StagedBundle, VOCABULARY_FILE, read_bundle, write_bundle,
};
pub use config::{ConfigValidationError, DEFAULT_MODEL_DIR, TrainerConfig, TrainerConfigBuilder};
pub use corpus::{CANONICAL_CORPUS_NAME, Corpus, load_corpus, resolve_corpus};
pub use error::{Result as TrainingResult, ResultExt, TrainingError};
pub use metrics::{ClassMetrics, ClassificationReport, EvaluationReport, average_precision, evaluate};
pub use pipeline::{DECISION_THRESHOLD, TrainedArtifacts, Trainer, TrainingOutcome, imbalance_weight};
pub use split::{SplitIndices, stratified_split};
pub use storage::{LocalStorage, Location, Storage, StorageRouter};

#[cfg(feature = "gcs")]
pub use storage::GcsStorage;
