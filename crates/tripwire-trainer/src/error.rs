//! Error types for the training run.
//!
//! Every fallible operation in this crate returns [`TrainingError`]. Each
//! variant maps to a stable [`error_code`](TrainingError::error_code) so the
//! exit message of a failed job can be matched on by whatever scheduled it.

use crate::config::ConfigValidationError;
use thiserror::Error;
use tripwire_features::FeatureError;

/// The main error type for a training run.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// Neither `--data-path` nor `AIP_TRAINING_DATA_URI` was provided.
    #[error("No corpus location given; pass --data-path or set AIP_TRAINING_DATA_URI")]
    MissingCorpusPath,

    /// The corpus location does not exist.
    #[error("Corpus not found at '{0}'")]
    CorpusNotFound(String),

    /// A corpus directory holds no CSV file.
    #[error("No CSV file found under '{0}'")]
    NoCsvFound(String),

    /// The CSV lacks one or more configured columns.
    #[error("CSV must contain columns {missing:?} (found {available:?})")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The corpus cannot be trained on (e.g. a class too small to stratify).
    #[error("Invalid training data: {0}")]
    InvalidData(String),

    /// Label encoding or vectorization failed.
    #[error("Feature extraction failed: {0}")]
    Features(#[from] FeatureError),

    /// No storage backend handles this location.
    #[error("Unsupported location '{0}'")]
    UnsupportedLocation(String),

    /// A storage backend reported a failure.
    #[error("Storage error at '{location}': {reason}")]
    Storage { location: String, reason: String },

    /// An artifact is missing from the destination after publication.
    #[error("Artifact bundle incomplete: '{0}' missing at destination")]
    BundleIncomplete(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error (object storage, only with "gcs" feature).
    #[cfg(feature = "gcs")]
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TrainingError>,
    },
}

impl TrainingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TrainingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn storage(location: impl ToString, reason: impl ToString) -> Self {
        TrainingError::Storage {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Stable code printed with the failure message.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCorpusPath => "MISSING_CORPUS_PATH",
            Self::CorpusNotFound(_) => "CORPUS_NOT_FOUND",
            Self::NoCsvFound(_) => "NO_CSV_FOUND",
            Self::MissingColumns { .. } => "MISSING_COLUMNS",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::Features(e) if e.is_vocabulary_format() => "VOCABULARY_FORMAT",
            Self::Features(_) => "FEATURE_ERROR",
            Self::UnsupportedLocation(_) => "UNSUPPORTED_LOCATION",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::BundleIncomplete(_) => "BUNDLE_INCOMPLETE",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            #[cfg(feature = "gcs")]
            Self::HttpRequest(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the run failed because of how it was configured rather than
    /// because of the data or the environment.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::MissingCorpusPath
            | Self::MissingColumns { .. }
            | Self::InvalidConfig(_)
            | Self::UnsupportedLocation(_) => true,
            Self::Features(e) => {
                e.is_vocabulary_format()
                    || matches!(
                        e,
                        FeatureError::InvalidPattern { .. } | FeatureError::InvalidConfig(_)
                    )
            }
            Self::WithContext { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

impl From<ConfigValidationError> for TrainingError {
    fn from(err: ConfigValidationError) -> Self {
        match err {
            ConfigValidationError::MissingCorpusPath => TrainingError::MissingCorpusPath,
            other => TrainingError::InvalidConfig(other.to_string()),
        }
    }
}

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TrainingError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, FeatureError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TrainingError::Features(e).with_context(context))
    }
}
