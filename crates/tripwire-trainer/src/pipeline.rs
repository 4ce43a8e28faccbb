//! Training orchestrator.
//!
//! [`Trainer`] runs one batch job end to end:
//!
//! 1. resolve and load the corpus
//! 2. encode labels
//! 3. stratified split
//! 4. fit the vectorizer on the train split (learned or locked vocabulary)
//! 5. compute the class-imbalance weight
//! 6. boost with early stopping on the test split
//! 7. evaluate at threshold 0.5
//! 8. publish the artifact bundle
//!
//! Any failure aborts the run; nothing is retried and nothing is published
//! unless every artifact can be.

use crate::booster::{Booster, LabeledMatrix};
use crate::bundle::{ArtifactBundle, BundleMetadata, write_bundle};
use crate::config::TrainerConfig;
use crate::corpus::{load_corpus, resolve_corpus};
use crate::error::{Result, ResultExt, TrainingError};
use crate::metrics::{EvaluationReport, evaluate};
use crate::split::stratified_split;
use crate::storage::{Location, Storage};
use static_assertions::assert_impl_all;
use tracing::{info, warn};
use tripwire_features::{
    LabelEncoder, LabelSummary, TfidfVectorizer, VocabularyDocument, VocabularySource,
};

/// Probability at or above which a message is classified SCAM.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// `negatives / positives`; `1.0` when either class is absent, so the weight
/// stays positive.
pub fn imbalance_weight(labels: &[u8]) -> f64 {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        1.0
    } else {
        negatives as f64 / positives as f64
    }
}

/// Everything a run produces before publication.
#[derive(Debug, Clone)]
pub struct TrainedArtifacts {
    /// The CSV actually trained on.
    pub corpus: Location,
    pub label_summary: LabelSummary,
    pub train_rows: usize,
    pub test_rows: usize,
    pub scale_pos_weight: f64,
    pub booster: Booster,
    pub vocabulary: VocabularyDocument,
    pub evaluation: EvaluationReport,
    pub metadata: BundleMetadata,
}

impl TrainedArtifacts {
    /// Serialize into the three bundle files.
    pub fn bundle(&self) -> Result<ArtifactBundle> {
        ArtifactBundle::new(&self.booster, &self.vocabulary, &self.metadata)
    }
}

/// A completed, published run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifacts: TrainedArtifacts,
    pub destination: Location,
    pub published: Vec<Location>,
}

/// Runs the training job for one configuration.
pub struct Trainer {
    config: TrainerConfig,
    storage: Box<dyn Storage>,
}

assert_impl_all!(Trainer: Send);

impl Trainer {
    pub fn new(config: TrainerConfig, storage: Box<dyn Storage>) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train and publish the bundle to the configured model directory.
    pub fn run(&self) -> Result<TrainingOutcome> {
        let destination = Location::parse(&self.config.model_dir)?;
        info!("Model output directory: {}", destination);

        let artifacts = self.train()?;
        let bundle = artifacts.bundle()?;
        let published = write_bundle(self.storage.as_ref(), &destination, &bundle)?;

        info!("Done. Bundle published to {}", destination);
        Ok(TrainingOutcome {
            artifacts,
            destination,
            published,
        })
    }

    /// Train and evaluate without publishing anything.
    pub fn train(&self) -> Result<TrainedArtifacts> {
        let config = &self.config;
        let storage = self.storage.as_ref();

        // 1. Corpus
        let source = Location::parse(&config.data_path)?;
        let corpus_location = resolve_corpus(storage, &source)?;
        let corpus = load_corpus(
            storage,
            &corpus_location,
            &config.text_column,
            &config.label_column,
        )?;
        if corpus.is_empty() {
            return Err(TrainingError::InvalidData(format!(
                "corpus {} has no rows",
                corpus_location
            )));
        }

        // 2. Labels
        let encoder = LabelEncoder::new(config.pos_regex.as_str())?;
        let encoding = encoder.encode(corpus.raw_labels.iter().map(|l| l.as_deref()));
        let label_summary = encoding.summary();
        info!(
            "Label encoding: {}",
            serde_json::to_string_pretty(&label_summary)?
        );

        // 3. Split
        let split = stratified_split(encoding.labels(), config.test_fraction, config.split_seed)?;
        let (train_texts, test_texts) = split.apply(&corpus.texts);
        let (y_train, y_test) = split.apply(encoding.labels());
        info!(
            "Split {} rows: train={}, test={}",
            corpus.len(),
            y_train.len(),
            y_test.len()
        );

        // 4. Vectorizer
        let mut vectorizer = self.build_vectorizer()?;
        let x_train = vectorizer
            .fit_transform(&train_texts)
            .context("Fitting vectorizer on train split")?;
        let x_test = vectorizer.transform(&test_texts)?;
        info!(
            "Vectorized: {} features ({} vocabulary)",
            x_train.n_cols(),
            if vectorizer.is_locked() { "locked" } else { "learned" }
        );

        // 5. Imbalance
        let scale_pos_weight = imbalance_weight(&y_train);
        let positives = y_train.iter().filter(|&&y| y == 1).count();
        info!(
            "Train counts -> pos={}, neg={}, scale_pos_weight={:.4}",
            positives,
            y_train.len() - positives,
            scale_pos_weight
        );

        // 6. Boost
        let train_set = LabeledMatrix::new(&x_train, &y_train)?;
        let test_set = LabeledMatrix::new(&x_test, &y_test)?;
        let booster = Booster::train(&config.booster, scale_pos_weight, &train_set, Some(&test_set))?;

        // 7. Evaluate
        let probabilities = booster.predict_proba(&x_test)?;
        let evaluation = evaluate(&y_test, &probabilities, DECISION_THRESHOLD);
        info!(
            "=== Classification Report (threshold={}) ===\n{}",
            DECISION_THRESHOLD, evaluation.report
        );
        info!(
            "[METRIC] precision={:.4} recall={:.4} f1={:.4}",
            evaluation.precision, evaluation.recall, evaluation.f1
        );
        if evaluation.f1 < config.f1_warning_threshold {
            warn!(
                "F1 {:.4} is below {:.2}; consider tuning ngrams/max_features or the threshold",
                evaluation.f1, config.f1_warning_threshold
            );
        }

        let vocabulary = vectorizer.to_document()?;
        let metadata = BundleMetadata {
            label_column: config.label_column.clone(),
            text_column: config.text_column.clone(),
            pos_regex: config.pos_regex.clone(),
            vec_dim: x_train.n_cols(),
            f1: evaluation.f1,
            precision: evaluation.precision,
            recall: evaluation.recall,
        };

        Ok(TrainedArtifacts {
            corpus: corpus_location,
            label_summary,
            train_rows: y_train.len(),
            test_rows: y_test.len(),
            scale_pos_weight,
            booster,
            vocabulary,
            evaluation,
            metadata,
        })
    }

    /// Learn a vocabulary, or lock to the configured one.
    fn build_vectorizer(&self) -> Result<TfidfVectorizer> {
        let vectorizer_config = self.config.vectorizer_config();
        let Some(path) = &self.config.vocabulary_path else {
            info!("Learning vocabulary from the train split");
            return Ok(TfidfVectorizer::learn(vectorizer_config)?);
        };

        let location = Location::parse(path)?;
        info!("Locking vocabulary from {}", location);
        let bytes = self
            .storage
            .read(&location)
            .context(format!("Loading vocabulary from {}", location))?;
        let source = VocabularySource::parse(&bytes)
            .context(format!("Parsing vocabulary {}", location))?;
        TfidfVectorizer::from_source(vectorizer_config, source)
            .context(format!("Locking vocabulary {}", location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use std::path::Path;

    #[test]
    fn test_imbalance_weight() {
        let mut labels = vec![1u8; 10];
        labels.extend(vec![0u8; 90]);
        assert_eq!(imbalance_weight(&labels), 9.0);
        assert_eq!(imbalance_weight(&[0, 0, 0]), 1.0);
        assert_eq!(imbalance_weight(&[]), 1.0);
        assert_eq!(imbalance_weight(&[1, 1]), 1.0);
    }

    fn write_corpus(dir: &Path, rows: &[(&str, &str)]) {
        let mut csv = String::from("text,label\n");
        for (text, label) in rows {
            csv.push_str(&format!("\"{}\",{}\n", text, label));
        }
        std::fs::write(dir.join("corpus.csv"), csv).unwrap();
    }

    fn trainer(dir: &Path) -> Trainer {
        let config = TrainerConfig::builder()
            .data_path(dir.join("corpus.csv").to_string_lossy())
            .model_dir(dir.join("model").to_string_lossy())
            .build()
            .unwrap();
        Trainer::new(config, Box::new(LocalStorage::new()))
    }

    #[test]
    fn test_missing_columns_fail_before_training() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corpus.csv"), "body,label\nhello,ham\n").unwrap();

        let err = trainer(dir.path()).run().unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMNS");
        assert!(!dir.path().join("model").exists());
    }

    #[test]
    fn test_tiny_class_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = vec![("win free prize", "spam")];
        rows.extend(std::iter::repeat_n(("lunch at noon", "ham"), 20));
        write_corpus(dir.path(), &rows);

        let err = trainer(dir.path()).train().unwrap_err();
        assert!(matches!(err, TrainingError::InvalidData(_)));
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &[("a b", "ham")]);
        let config = TrainerConfig::builder()
            .data_path(dir.path().join("corpus.csv").to_string_lossy())
            .pos_regex("(unclosed")
            .build()
            .unwrap();

        let err = Trainer::new(config, Box::new(LocalStorage::new()))
            .train()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_vocabulary_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = vec![("win free prize now", "spam"); 5];
        rows.extend(vec![("lunch meeting at noon", "ham"); 15]);
        write_corpus(dir.path(), &rows);
        std::fs::write(dir.path().join("vocab.json"), "[\"free\", \"win\"]").unwrap();

        let config = TrainerConfig::builder()
            .data_path(dir.path().join("corpus.csv").to_string_lossy())
            .vocabulary_path(dir.path().join("vocab.json").to_string_lossy())
            .build()
            .unwrap();
        let err = Trainer::new(config, Box::new(LocalStorage::new()))
            .train()
            .unwrap_err();
        assert_eq!(err.error_code(), "VOCABULARY_FORMAT");
    }
}
