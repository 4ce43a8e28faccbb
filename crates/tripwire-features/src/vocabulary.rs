//! Vocabulary mapping and its persisted document.
//!
//! A [`Vocabulary`] assigns each term a feature index. Indices are always the
//! contiguous range `0..len`, so the vocabulary size *is* the feature
//! dimension.
//!
//! The persisted form is [`VocabularyDocument`]:
//!
//! ```json
//! {
//!   "vocabulary": {"free": 0, "win": 1},
//!   "ngram_range": [1, 2],
//!   "max_features": null,
//!   "min_df": 2,
//!   "lowercase": true,
//!   "stop_words": "english"
//! }
//! ```
//!
//! Older bundles stored only the bare `{term: index}` mapping. Both shapes are
//! read by [`VocabularySource::parse`]; only the tagged document is written.

use crate::analyzer::StopWords;
use crate::error::{FeatureError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Term → feature index, with contiguous indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    index: HashMap<String, usize>,
    terms: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary whose indices follow the order of `terms`.
    ///
    /// Duplicate terms are rejected.
    pub fn from_terms(terms: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(terms.len());
        for (i, term) in terms.iter().enumerate() {
            if index.insert(term.clone(), i).is_some() {
                return Err(FeatureError::VocabularyFormat(format!(
                    "term '{}' appears more than once",
                    term
                )));
            }
        }
        Ok(Self { index, terms })
    }

    /// Build a vocabulary from a persisted mapping, validating the indices.
    pub fn from_mapping<I>(mapping: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, usize)>,
    {
        let entries: Vec<(String, usize)> = mapping.into_iter().collect();
        if entries.is_empty() {
            return Err(FeatureError::VocabularyFormat(
                "empty vocabulary passed to fit".to_string(),
            ));
        }

        let size = entries.len();
        let mut slots: Vec<Option<String>> = vec![None; size];
        for (term, idx) in entries {
            if idx >= size {
                return Err(FeatureError::VocabularyFormat(format!(
                    "index {} of term '{}' is out of range for a vocabulary of size {}",
                    idx, term, size
                )));
            }
            if slots[idx].is_some() {
                return Err(FeatureError::VocabularyFormat(
                    "vocabulary contains repeated indices".to_string(),
                ));
            }
            slots[idx] = Some(term);
        }

        // Every slot is filled: `size` distinct in-range indices for `size` entries.
        let terms = slots.into_iter().flatten().collect();
        Self::from_terms(terms)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Feature index of a term, if it is part of the vocabulary.
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Term stored at a feature index.
    pub fn term(&self, index: usize) -> Option<&str> {
        self.terms.get(index).map(String::as_str)
    }

    /// Terms in index order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// `(term, index)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.terms.iter().enumerate().map(|(i, t)| (t.as_str(), i))
    }

    /// Sorted mapping, as written into the vocabulary document.
    pub fn to_mapping(&self) -> BTreeMap<String, usize> {
        self.iter().map(|(t, i)| (t.to_string(), i)).collect()
    }
}

fn default_ngram_range() -> [usize; 2] {
    [1, 2]
}

fn default_min_df() -> usize {
    1
}

fn default_lowercase() -> bool {
    true
}

fn default_stop_words() -> Option<StopWords> {
    Some(StopWords::English)
}

/// The vocabulary document written into every artifact bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyDocument {
    pub vocabulary: BTreeMap<String, usize>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: [usize; 2],
    /// Always written as `null`; the vocabulary already bounds the dimension.
    #[serde(default)]
    pub max_features: Option<usize>,
    #[serde(default = "default_min_df")]
    pub min_df: usize,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
    #[serde(default = "default_stop_words")]
    pub stop_words: Option<StopWords>,
}

impl VocabularyDocument {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A vocabulary read back from a previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabularySource {
    /// The current `{"vocabulary": {...}, ...}` document.
    Document(VocabularyDocument),
    /// A bare `{term: index}` mapping from older bundles.
    Legacy(BTreeMap<String, usize>),
}

impl VocabularySource {
    /// Parse either accepted shape. Any other JSON value is a format error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;

        let serde_json::Value::Object(object) = value else {
            return Err(FeatureError::VocabularyFormat(
                "expected a JSON object".to_string(),
            ));
        };

        // Only an object under "vocabulary" marks a document; a bare mapping
        // may well contain the term "vocabulary" itself.
        if let Some(serde_json::Value::Object(_)) = object.get("vocabulary") {
            let document: VocabularyDocument =
                serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
                    FeatureError::VocabularyFormat(format!("invalid vocabulary document: {}", e))
                })?;
            return Ok(Self::Document(document));
        }

        let mapping: BTreeMap<String, usize> =
            serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
                FeatureError::VocabularyFormat(format!(
                    "bare mapping must be term to non-negative index: {}",
                    e
                ))
            })?;
        warn!("Loaded a legacy bare vocabulary mapping; re-save it as a vocabulary document");
        Ok(Self::Legacy(mapping))
    }

    /// The `ngram_range` recorded with the vocabulary, if the shape carries one.
    pub fn ngram_range(&self) -> Option<(usize, usize)> {
        match self {
            Self::Document(doc) => Some((doc.ngram_range[0], doc.ngram_range[1])),
            Self::Legacy(_) => None,
        }
    }

    /// Validate and convert into a [`Vocabulary`].
    pub fn into_vocabulary(self) -> Result<Vocabulary> {
        let mapping = match self {
            Self::Document(doc) => doc.vocabulary,
            Self::Legacy(mapping) => mapping,
        };
        Vocabulary::from_mapping(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tagged_document() {
        let json = br#"{"vocabulary": {"free": 0, "win": 1}, "ngram_range": [1, 1], "min_df": 3}"#;
        let source = VocabularySource::parse(json).unwrap();
        assert_eq!(source.ngram_range(), Some((1, 1)));

        let VocabularySource::Document(doc) = &source else {
            panic!("expected tagged document");
        };
        assert_eq!(doc.min_df, 3);
        assert_eq!(doc.max_features, None);
        assert!(doc.lowercase);
        assert_eq!(doc.stop_words, Some(StopWords::English));

        let vocab = source.into_vocabulary().unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.index_of("win"), Some(1));
    }

    #[test]
    fn test_parse_legacy_mapping() {
        let source = VocabularySource::parse(br#"{"free": 0, "win": 1}"#).unwrap();
        assert!(matches!(source, VocabularySource::Legacy(_)));
        assert_eq!(source.ngram_range(), None);
        let vocab = source.into_vocabulary().unwrap();
        assert_eq!(vocab.term(0), Some("free"));
    }

    #[test]
    fn test_legacy_mapping_may_contain_vocabulary_term() {
        let source = VocabularySource::parse(br#"{"free": 0, "vocabulary": 1, "win": 2}"#).unwrap();
        assert!(matches!(source, VocabularySource::Legacy(_)));
        let vocab = source.into_vocabulary().unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.index_of("vocabulary"), Some(1));
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        let cases: [&[u8]; 5] = [
            br#"["free", "win"]"#,
            br#"42"#,
            br#"{"vocabulary": ["free"]}"#,
            br#"{"free": "zero"}"#,
            br#"{"free": -1}"#,
        ];
        for json in cases {
            let err = VocabularySource::parse(json).unwrap_err();
            assert!(err.is_vocabulary_format(), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = VocabularySource::parse(b"{not json").unwrap_err();
        assert!(matches!(err, FeatureError::Json(_)));
    }

    #[test]
    fn test_repeated_indices_rejected() {
        let err = Vocabulary::from_mapping([("a".to_string(), 0), ("b".to_string(), 0)]).unwrap_err();
        assert!(err.to_string().contains("repeated indices"));
    }

    #[test]
    fn test_index_gap_rejected() {
        let err = Vocabulary::from_mapping([("a".to_string(), 0), ("b".to_string(), 2)]).unwrap_err();
        assert!(matches!(err, FeatureError::VocabularyFormat(_)));
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let err = Vocabulary::from_mapping(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("empty vocabulary"));
    }

    #[test]
    fn test_document_round_trip_keeps_schema() {
        let vocab = Vocabulary::from_terms(vec!["free".into(), "win".into()]).unwrap();
        let doc = VocabularyDocument {
            vocabulary: vocab.to_mapping(),
            ngram_range: [1, 2],
            max_features: None,
            min_df: 2,
            lowercase: true,
            stop_words: Some(StopWords::English),
        };

        let value: serde_json::Value = serde_json::from_slice(&doc.to_json_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "vocabulary": {"free": 0, "win": 1},
                "ngram_range": [1, 2],
                "max_features": null,
                "min_df": 2,
                "lowercase": true,
                "stop_words": "english"
            })
        );
    }
}
