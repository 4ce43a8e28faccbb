//! TF-IDF vectorizer with learned or locked vocabulary.
//!
//! # Modes
//!
//! - **Learn**: the vocabulary is discovered from the documents passed to
//!   [`TfidfVectorizer::fit`]. Terms are sorted lexicographically, pruned by
//!   document frequency (`min_df`), optionally capped to the `max_features`
//!   most frequent terms, and indexed in lexicographic order.
//! - **Locked**: the vocabulary comes from a previous bundle. Fitting only
//!   recomputes the IDF weights; the term set and every index stay fixed, so a
//!   serving process holding the persisted document resolves each term to the
//!   same column as training did.
//!
//! # Weighting
//!
//! `idf(t) = ln((1 + n) / (1 + df(t))) + 1`, row value = count × idf, each row
//! L2-normalised and stored as `f32`.
//!
//! # Example
//!
//! ```
//! use tripwire_features::{TfidfVectorizer, VectorizerConfig};
//!
//! let docs = vec!["win a free prize".to_string(), "free lunch at noon".to_string()];
//! let config = VectorizerConfig::default().min_df(1);
//! let mut vectorizer = TfidfVectorizer::learn(config)?;
//! let features = vectorizer.fit_transform(&docs)?;
//!
//! assert_eq!(features.n_rows(), 2);
//! assert_eq!(features.n_cols(), vectorizer.vocabulary().unwrap().len());
//! # Ok::<(), tripwire_features::FeatureError>(())
//! ```

use crate::analyzer::{Analyzer, StopWords};
use crate::error::{FeatureError, Result};
use crate::matrix::FeatureMatrix;
use crate::vocabulary::{Vocabulary, VocabularyDocument, VocabularySource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Configuration of the text vectorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Inclusive n-gram span. Default: (1, 2)
    pub ngram_range: (usize, usize),
    /// Minimum number of training documents a term must occur in. Default: 2
    pub min_df: usize,
    /// Learn-mode cap on vocabulary size. Default: 5000
    pub max_features: Option<usize>,
    /// Default: true
    pub lowercase: bool,
    /// Default: English
    pub stop_words: Option<StopWords>,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            ngram_range: (1, 2),
            min_df: 2,
            max_features: Some(5000),
            lowercase: true,
            stop_words: Some(StopWords::English),
        }
    }
}

impl VectorizerConfig {
    pub fn ngram_range(mut self, min: usize, max: usize) -> Self {
        self.ngram_range = (min, max);
        self
    }

    pub fn min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    pub fn max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.ngram_range;
        if min == 0 || max < min {
            return Err(FeatureError::InvalidConfig(format!(
                "ngram_range ({}, {}) must satisfy 1 <= min <= max",
                min, max
            )));
        }
        if self.min_df == 0 {
            return Err(FeatureError::InvalidConfig(
                "min_df must be at least 1".to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(FeatureError::InvalidConfig(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn analyzer(&self) -> Analyzer {
        Analyzer::new(self.ngram_range, self.lowercase, self.stop_words)
    }
}

/// Term-frequency × inverse-document-frequency vectorizer.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
    analyzer: Analyzer,
    vocabulary: Option<Vocabulary>,
    locked: bool,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// A vectorizer that learns its vocabulary on [`fit`](Self::fit).
    pub fn learn(config: VectorizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: config.analyzer(),
            config,
            vocabulary: None,
            locked: false,
            idf: Vec::new(),
        })
    }

    /// A vectorizer whose term set and indices are fixed to `vocabulary`.
    ///
    /// `max_features` is dropped: the vocabulary fixes the dimension.
    pub fn locked(config: VectorizerConfig, vocabulary: Vocabulary) -> Result<Self> {
        let config = config.max_features(None);
        config.validate()?;
        if vocabulary.is_empty() {
            return Err(FeatureError::VocabularyFormat(
                "empty vocabulary passed to fit".to_string(),
            ));
        }
        Ok(Self {
            analyzer: config.analyzer(),
            config,
            vocabulary: Some(vocabulary),
            locked: true,
            idf: Vec::new(),
        })
    }

    /// Lock to a vocabulary read back from a previous bundle.
    pub fn from_source(config: VectorizerConfig, source: VocabularySource) -> Result<Self> {
        if let Some(stored) = source.ngram_range()
            && stored != config.ngram_range
        {
            warn!(
                "Vocabulary document was built with ngram_range {:?}, vectorizer is configured with {:?}",
                stored, config.ngram_range
            );
        }
        let vocabulary = source.into_vocabulary()?;
        info!("Locked vocabulary with {} terms", vocabulary.len());
        Self::locked(config, vocabulary)
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some() && !self.idf.is_empty()
    }

    /// The vocabulary; `None` only before a learn-mode fit.
    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    /// Per-term IDF weights in feature-index order; empty before fitting.
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Fit vocabulary (learn mode only) and IDF weights on `documents`.
    pub fn fit(&mut self, documents: &[String]) -> Result<()> {
        if !self.locked {
            self.vocabulary = Some(self.learn_vocabulary(documents)?);
        }
        let vocabulary = self.vocabulary.as_ref().ok_or(FeatureError::NotFitted)?;
        self.idf = compute_idf(&self.analyzer, vocabulary, documents);
        debug!(
            "Fitted IDF over {} documents, {} features",
            documents.len(),
            self.idf.len()
        );
        Ok(())
    }

    /// Map documents into feature space. Never changes fitted state.
    pub fn transform(&self, documents: &[String]) -> Result<FeatureMatrix> {
        let vocabulary = self.vocabulary.as_ref().ok_or(FeatureError::NotFitted)?;
        if self.idf.len() != vocabulary.len() {
            return Err(FeatureError::NotFitted);
        }

        let mut matrix = FeatureMatrix::new(vocabulary.len());
        for document in documents {
            let mut counts: BTreeMap<u32, f64> = BTreeMap::new();
            for term in self.analyzer.analyze(document) {
                if let Some(idx) = vocabulary.index_of(&term) {
                    *counts.entry(idx as u32).or_insert(0.0) += 1.0;
                }
            }

            let weighted: Vec<(u32, f64)> = counts
                .into_iter()
                .map(|(idx, count)| (idx, count * self.idf[idx as usize]))
                .collect();
            let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();

            let row: Vec<(u32, f32)> = if norm > 0.0 {
                weighted
                    .into_iter()
                    .map(|(idx, w)| (idx, (w / norm) as f32))
                    .collect()
            } else {
                Vec::new()
            };
            matrix.push_row(&row);
        }
        Ok(matrix)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<FeatureMatrix> {
        self.fit(documents)?;
        self.transform(documents)
    }

    /// The persisted vocabulary-plus-config document.
    ///
    /// `max_features` is always `null` here: once fitted, the vocabulary
    /// itself fixes the dimension, whether it was learned or locked.
    pub fn to_document(&self) -> Result<VocabularyDocument> {
        let vocabulary = self.vocabulary.as_ref().ok_or(FeatureError::NotFitted)?;
        Ok(VocabularyDocument {
            vocabulary: vocabulary.to_mapping(),
            ngram_range: [self.config.ngram_range.0, self.config.ngram_range.1],
            max_features: None,
            min_df: self.config.min_df,
            lowercase: self.config.lowercase,
            stop_words: self.config.stop_words,
        })
    }

    fn learn_vocabulary(&self, documents: &[String]) -> Result<Vocabulary> {
        let n_docs = documents.len();
        if n_docs < self.config.min_df {
            return Err(FeatureError::InvalidConfig(format!(
                "min_df={} exceeds the number of training documents ({})",
                self.config.min_df, n_docs
            )));
        }

        // term -> (document frequency, total frequency)
        let mut stats: HashMap<String, (usize, usize)> = HashMap::new();
        for document in documents {
            let terms = self.analyzer.analyze(document);
            let mut seen: HashSet<&str> = HashSet::new();
            for term in &terms {
                let first_in_doc = seen.insert(term.as_str());
                let entry = stats.entry(term.clone()).or_insert((0, 0));
                entry.1 += 1;
                if first_in_doc {
                    entry.0 += 1;
                }
            }
        }

        if stats.is_empty() {
            return Err(FeatureError::EmptyVocabulary);
        }

        let mut candidates: Vec<(String, usize, usize)> = stats
            .into_iter()
            .map(|(term, (df, tf))| (term, df, tf))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        let total_terms = candidates.len();

        let mut kept: Vec<(String, usize, usize)> = candidates
            .into_iter()
            .filter(|(_, df, _)| *df >= self.config.min_df)
            .collect();
        if kept.is_empty() {
            return Err(FeatureError::NoTermsRemain);
        }

        if let Some(limit) = self.config.max_features
            && kept.len() > limit
        {
            // Stable: equal frequencies keep lexicographic order.
            kept.sort_by(|a, b| b.2.cmp(&a.2));
            kept.truncate(limit);
            kept.sort_by(|a, b| a.0.cmp(&b.0));
        }

        info!(
            "Learned vocabulary: {} of {} terms kept (min_df={}, max_features={:?})",
            kept.len(),
            total_terms,
            self.config.min_df,
            self.config.max_features
        );

        Vocabulary::from_terms(kept.into_iter().map(|(term, _, _)| term).collect())
    }
}

fn compute_idf(analyzer: &Analyzer, vocabulary: &Vocabulary, documents: &[String]) -> Vec<f64> {
    let mut df = vec![0usize; vocabulary.len()];
    for document in documents {
        let mut seen: HashSet<usize> = HashSet::new();
        for term in analyzer.analyze(document) {
            if let Some(idx) = vocabulary.index_of(&term)
                && seen.insert(idx)
            {
                df[idx] += 1;
            }
        }
    }

    let n = documents.len() as f64;
    df.into_iter()
        .map(|d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
        .collect()
}
