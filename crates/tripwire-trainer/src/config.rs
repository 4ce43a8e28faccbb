//! Configuration types for a training run.
//!
//! [`TrainerConfig`] carries every knob of one run, from the corpus location to
//! the boosting parameters. It is assembled once at start-up (by the CLI or a
//! test) through [`TrainerConfigBuilder`], validated, and then threaded
//! explicitly into the orchestrator and the bundle writer.

use crate::booster::BoosterParams;
use serde::{Deserialize, Serialize};
use tripwire_features::{DEFAULT_POSITIVE_PATTERN, VectorizerConfig};

/// Output location used when neither `--model-dir` nor `AIP_MODEL_DIR` is set.
pub const DEFAULT_MODEL_DIR: &str = "/tmp/model";

/// Configuration for one training run.
///
/// # Example
///
/// ```rust
/// use tripwire_trainer::TrainerConfig;
///
/// let config = TrainerConfig::builder()
///     .data_path("gs://corpus-bucket/exports/")
///     .model_dir("/tmp/model")
///     .min_df(1)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.text_column, "text");
/// assert_eq!(config.ngram_range, (1, 2));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Corpus location: a CSV file or a directory holding one.
    pub data_path: String,

    /// Destination of the artifact bundle.
    /// Default: "/tmp/model"
    pub model_dir: String,

    /// Default: "text"
    pub text_column: String,

    /// Default: "label"
    pub label_column: String,

    /// Case-insensitive rule defining the positive (SCAM) class.
    /// Default: "(spam|scam|phish|fraud|malicious)"
    pub pos_regex: String,

    /// Learn-mode vocabulary cap. Ignored when a vocabulary is locked.
    /// Default: 5000
    pub max_features: usize,

    /// Inclusive n-gram span.
    /// Default: (1, 2)
    pub ngram_range: (usize, usize),

    /// Minimum number of training documents a term must occur in.
    /// Default: 2
    pub min_df: usize,

    /// Previously persisted vocabulary. When set, the vocabulary is locked.
    /// Default: None
    pub vocabulary_path: Option<String>,

    /// F1 below this bar logs a warning. It never fails the run.
    /// Default: 0.80
    pub f1_warning_threshold: f64,

    /// Share of rows held out for evaluation.
    /// Default: 0.2
    pub test_fraction: f64,

    /// Seed of the stratified split.
    /// Default: 42
    pub split_seed: u64,

    /// Gradient boosting parameters.
    pub booster: BoosterParams,
}

impl TrainerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TrainerConfigBuilder {
        TrainerConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.data_path.trim().is_empty() {
            return Err(ConfigValidationError::MissingCorpusPath);
        }

        for (field, value) in [
            ("model_dir", &self.model_dir),
            ("text_column", &self.text_column),
            ("label_column", &self.label_column),
            ("pos_regex", &self.pos_regex),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::EmptyField(field));
            }
        }

        let (min, max) = self.ngram_range;
        if min == 0 || max < min {
            return Err(ConfigValidationError::InvalidNgramRange { min, max });
        }

        if self.min_df == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "min_df",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.max_features == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "max_features",
                reason: "must be at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.f1_warning_threshold) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "f1_warning_threshold",
                value: self.f1_warning_threshold,
            });
        }

        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "test_fraction",
                value: self.test_fraction,
            });
        }

        self.booster
            .validate()
            .map_err(|(field, reason)| ConfigValidationError::InvalidValue { field, reason })
    }

    /// Vectorizer settings derived from this configuration.
    pub fn vectorizer_config(&self) -> VectorizerConfig {
        VectorizerConfig::default()
            .ngram_range(self.ngram_range.0, self.ngram_range.1)
            .min_df(self.min_df)
            .max_features(Some(self.max_features))
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("No corpus location configured")]
    MissingCorpusPath,

    #[error("'{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("Invalid ngram range ({min}, {max}) (must satisfy 1 <= min <= max)")]
    InvalidNgramRange { min: usize, max: usize },

    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Builder for [`TrainerConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct TrainerConfigBuilder {
    data_path: Option<String>,
    model_dir: Option<String>,
    text_column: Option<String>,
    label_column: Option<String>,
    pos_regex: Option<String>,
    max_features: Option<usize>,
    ngram_range: Option<(usize, usize)>,
    min_df: Option<usize>,
    vocabulary_path: Option<String>,
    f1_warning_threshold: Option<f64>,
    test_fraction: Option<f64>,
    split_seed: Option<u64>,
    booster: Option<BoosterParams>,
}

impl TrainerConfigBuilder {
    /// Set the corpus location (local path or `gs://` URI).
    pub fn data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    /// Set the bundle destination (local directory or `gs://` prefix).
    pub fn model_dir(mut self, path: impl Into<String>) -> Self {
        self.model_dir = Some(path.into());
        self
    }

    pub fn text_column(mut self, column: impl Into<String>) -> Self {
        self.text_column = Some(column.into());
        self
    }

    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Set the positive-class rule.
    pub fn pos_regex(mut self, pattern: impl Into<String>) -> Self {
        self.pos_regex = Some(pattern.into());
        self
    }

    pub fn max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn ngram_range(mut self, min: usize, max: usize) -> Self {
        self.ngram_range = Some((min, max));
        self
    }

    pub fn min_df(mut self, min_df: usize) -> Self {
        self.min_df = Some(min_df);
        self
    }

    /// Lock the vocabulary to a previously persisted document.
    pub fn vocabulary_path(mut self, path: impl Into<String>) -> Self {
        self.vocabulary_path = Some(path.into());
        self
    }

    pub fn f1_warning_threshold(mut self, threshold: f64) -> Self {
        self.f1_warning_threshold = Some(threshold);
        self
    }

    pub fn test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = Some(fraction);
        self
    }

    pub fn split_seed(mut self, seed: u64) -> Self {
        self.split_seed = Some(seed);
        self
    }

    pub fn booster(mut self, params: BoosterParams) -> Self {
        self.booster = Some(params);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `TrainerConfig` or an error if validation fails.
    pub fn build(self) -> Result<TrainerConfig, ConfigValidationError> {
        let config = TrainerConfig {
            data_path: self.data_path.ok_or(ConfigValidationError::MissingCorpusPath)?,
            model_dir: self
                .model_dir
                .unwrap_or_else(|| DEFAULT_MODEL_DIR.to_string()),
            text_column: self.text_column.unwrap_or_else(|| "text".to_string()),
            label_column: self.label_column.unwrap_or_else(|| "label".to_string()),
            pos_regex: self
                .pos_regex
                .unwrap_or_else(|| DEFAULT_POSITIVE_PATTERN.to_string()),
            max_features: self.max_features.unwrap_or(5000),
            ngram_range: self.ngram_range.unwrap_or((1, 2)),
            min_df: self.min_df.unwrap_or(2),
            vocabulary_path: self.vocabulary_path,
            f1_warning_threshold: self.f1_warning_threshold.unwrap_or(0.80),
            test_fraction: self.test_fraction.unwrap_or(0.2),
            split_seed: self.split_seed.unwrap_or(42),
            booster: self.booster.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = TrainerConfig::builder().data_path("corpus.csv").build().unwrap();
        assert_eq!(config.model_dir, "/tmp/model");
        assert_eq!(config.text_column, "text");
        assert_eq!(config.label_column, "label");
        assert_eq!(config.pos_regex, "(spam|scam|phish|fraud|malicious)");
        assert_eq!(config.max_features, 5000);
        assert_eq!(config.ngram_range, (1, 2));
        assert_eq!(config.min_df, 2);
        assert_eq!(config.vocabulary_path, None);
        assert_eq!(config.f1_warning_threshold, 0.80);
        assert_eq!(config.split_seed, 42);
        assert_eq!(config.booster, BoosterParams::default());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = TrainerConfig::builder()
            .data_path("gs://bucket/data/")
            .model_dir("gs://bucket/model")
            .text_column("body")
            .label_column("category")
            .ngram_range(1, 3)
            .min_df(1)
            .vocabulary_path("gs://bucket/prev/tfidf_vocab.json")
            .build()
            .unwrap();

        assert_eq!(config.text_column, "body");
        assert_eq!(config.ngram_range, (1, 3));
        assert_eq!(
            config.vocabulary_path.as_deref(),
            Some("gs://bucket/prev/tfidf_vocab.json")
        );
    }

    #[test]
    fn test_validation_missing_corpus() {
        assert!(matches!(
            TrainerConfig::builder().build().unwrap_err(),
            ConfigValidationError::MissingCorpusPath
        ));
        assert!(matches!(
            TrainerConfig::builder().data_path("  ").build().unwrap_err(),
            ConfigValidationError::MissingCorpusPath
        ));
    }

    #[test]
    fn test_validation_invalid_ngram_range() {
        let result = TrainerConfig::builder()
            .data_path("corpus.csv")
            .ngram_range(3, 1)
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidNgramRange { min: 3, max: 1 }
        ));
    }

    #[test]
    fn test_validation_invalid_threshold() {
        let result = TrainerConfig::builder()
            .data_path("corpus.csv")
            .f1_warning_threshold(1.5)
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold { field: "f1_warning_threshold", .. }
        ));
    }

    #[test]
    fn test_validation_booster_params() {
        let params = BoosterParams {
            eta: 0.0,
            ..BoosterParams::default()
        };
        let result = TrainerConfig::builder()
            .data_path("corpus.csv")
            .booster(params)
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidValue { field: "eta", .. }
        ));
    }

    #[test]
    fn test_vectorizer_config() {
        let config = TrainerConfig::builder()
            .data_path("corpus.csv")
            .max_features(100)
            .min_df(3)
            .build()
            .unwrap();
        let vectorizer = config.vectorizer_config();
        assert_eq!(vectorizer.max_features, Some(100));
        assert_eq!(vectorizer.min_df, 3);
        assert_eq!(vectorizer.ngram_range, (1, 2));
    }

    #[test]
    fn test_config_serialization() {
        let config = TrainerConfig::builder().data_path("corpus.csv").build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: TrainerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
