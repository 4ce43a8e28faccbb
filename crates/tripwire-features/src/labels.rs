//! Binary label encoding.
//!
//! Raw label columns in exported corpora are free text ("spam", "Phishing",
//! "ham", "legit", ...). [`LabelEncoder`] collapses them into the binary target
//! the classifier is trained on: a row is positive (1, SCAM) when the
//! case-insensitive rule matches anywhere in its trimmed label, negative (0,
//! SAFE) otherwise.
//!
//! # Example
//!
//! ```
//! use tripwire_features::LabelEncoder;
//!
//! let encoder = LabelEncoder::default();
//! let encoding = encoder.encode([Some("Phishing"), Some("legit"), None]);
//!
//! assert_eq!(encoding.labels(), &[1, 0, 0]);
//! assert_eq!(encoding.positive_count(), 1);
//! ```

use crate::error::{FeatureError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a missing label is stringified before matching.
pub const MISSING_LABEL: &str = "nan";

/// Rule used when no pattern is configured.
pub const DEFAULT_POSITIVE_PATTERN: &str = r"(spam|scam|phish|fraud|malicious)";

/// Encodes raw label strings as 0/1 with a case-insensitive rule.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    pattern: String,
    rule: Regex,
}

impl Default for LabelEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_PATTERN).expect("default label pattern is valid")
    }
}

impl LabelEncoder {
    /// Compile `pattern` as a case-insensitive positive-class rule.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let rule = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| FeatureError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { pattern, rule })
    }

    /// The rule as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether a single raw label belongs to the positive class.
    pub fn is_positive(&self, raw: &str) -> bool {
        self.rule.is_match(raw.trim())
    }

    /// Encode a column of raw labels, preserving row order.
    ///
    /// Missing values are matched as [`MISSING_LABEL`].
    pub fn encode<'a, I>(&self, raw_labels: I) -> LabelEncoding
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut labels = Vec::new();
        let mut unique = BTreeSet::new();

        for raw in raw_labels {
            let trimmed = raw.unwrap_or(MISSING_LABEL).trim();
            labels.push(u8::from(self.rule.is_match(trimmed)));
            if !unique.contains(trimmed) {
                unique.insert(trimmed.to_string());
            }
        }

        let positive_count = labels.iter().filter(|&&y| y == 1).count();
        let negative_count = labels.len() - positive_count;

        LabelEncoding {
            labels,
            unique_labels: unique.into_iter().collect(),
            pattern: self.pattern.clone(),
            positive_count,
            negative_count,
        }
    }
}

/// Result of encoding one label column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoding {
    labels: Vec<u8>,
    unique_labels: Vec<String>,
    pattern: String,
    positive_count: usize,
    negative_count: usize,
}

impl LabelEncoding {
    /// Per-row outcome, 1 = positive.
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Consume the encoding, keeping only the per-row outcome.
    pub fn into_labels(self) -> Vec<u8> {
        self.labels
    }

    /// Sorted distinct trimmed raw labels.
    pub fn unique_labels(&self) -> &[String] {
        &self.unique_labels
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn positive_count(&self) -> usize {
        self.positive_count
    }

    pub fn negative_count(&self) -> usize {
        self.negative_count
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Diagnostic summary, logged by the trainer after encoding.
    pub fn summary(&self) -> LabelSummary {
        LabelSummary {
            unique_labels: self.unique_labels.clone(),
            positive_regex: self.pattern.clone(),
            positive_count: self.positive_count,
            negative_count: self.negative_count,
        }
    }
}

/// Serializable view of a [`LabelEncoding`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub unique_labels: Vec<String>,
    pub positive_regex: String,
    pub positive_count: usize,
    pub negative_count: usize,
}
