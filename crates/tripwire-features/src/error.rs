//! Error types for feature extraction.
//!
//! Everything in this crate that can fail returns [`FeatureError`]. The
//! variants separate problems with the persisted vocabulary document (which
//! must abort a training run) from problems with the corpus itself.

use thiserror::Error;

/// The error type for label encoding, vocabulary handling and vectorization.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FeatureError {
    /// The positive-class pattern is not a valid regular expression.
    #[error("Invalid label pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The vocabulary document has an unsupported shape or inconsistent indices.
    #[error("Unsupported vocabulary document: {0}")]
    VocabularyFormat(String),

    /// Analysis produced no terms at all.
    #[error("Empty vocabulary; perhaps the documents only contain stop words")]
    EmptyVocabulary,

    /// Every term was removed by document-frequency pruning.
    #[error("After pruning, no terms remain. Try a lower min_df")]
    NoTermsRemain,

    /// The vectorizer configuration cannot be applied to this corpus.
    #[error("Invalid vectorizer configuration: {0}")]
    InvalidConfig(String),

    /// A transform was attempted before the vectorizer was fit.
    #[error("Vectorizer is not fitted; call fit() first")]
    NotFitted,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeatureError {
    /// Whether this error comes from a malformed persisted vocabulary.
    pub fn is_vocabulary_format(&self) -> bool {
        matches!(self, Self::VocabularyFormat(_) | Self::Json(_))
    }
}

/// Result type alias for feature operations.
pub type Result<T> = std::result::Result<T, FeatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_format_classification() {
        assert!(FeatureError::VocabularyFormat("bad".to_string()).is_vocabulary_format());
        assert!(!FeatureError::NoTermsRemain.is_vocabulary_format());
    }

    #[test]
    fn test_error_messages() {
        let err = FeatureError::InvalidPattern {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert!(err.to_string().contains("'('"));
        assert!(FeatureError::NoTermsRemain.to_string().contains("min_df"));
    }
}
