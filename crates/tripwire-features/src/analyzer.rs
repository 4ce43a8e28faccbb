//! Document analysis: text to the list of terms that get counted.
//!
//! Training and serving must agree on this function exactly, otherwise a
//! token can resolve to a different (or no) feature index. The steps are:
//!
//! 1. lower-case the document (when enabled)
//! 2. extract tokens of two or more word characters (`\b\w\w+\b`)
//! 3. drop stop words
//! 4. emit n-grams for every `n` in the configured range, joined by one space

use crate::stop_words::is_english_stop_word;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

/// Stop-word policy, persisted as `"english"` or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopWords {
    #[default]
    English,
}

/// Settings that determine how a document is turned into terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analyzer {
    ngram_range: (usize, usize),
    lowercase: bool,
    stop_words: Option<StopWords>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            ngram_range: (1, 2),
            lowercase: true,
            stop_words: Some(StopWords::English),
        }
    }
}

impl Analyzer {
    /// Create an analyzer. `ngram_range` must satisfy `1 <= min <= max`;
    /// callers validate this through the vectorizer configuration.
    pub fn new(ngram_range: (usize, usize), lowercase: bool, stop_words: Option<StopWords>) -> Self {
        Self {
            ngram_range,
            lowercase,
            stop_words,
        }
    }

    pub fn ngram_range(&self) -> (usize, usize) {
        self.ngram_range
    }

    pub fn lowercase(&self) -> bool {
        self.lowercase
    }

    pub fn stop_words(&self) -> Option<StopWords> {
        self.stop_words
    }

    /// Split a document into its surviving unigram tokens.
    pub fn tokenize(&self, document: &str) -> Vec<String> {
        let text = if self.lowercase {
            document.to_lowercase()
        } else {
            document.to_string()
        };

        TOKEN_PATTERN
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|token| match self.stop_words {
                Some(StopWords::English) => !is_english_stop_word(token),
                None => true,
            })
            .map(str::to_string)
            .collect()
    }

    /// All terms of a document, unigrams first, in document order.
    pub fn analyze(&self, document: &str) -> Vec<String> {
        let tokens = self.tokenize(document);
        let (min_n, max_n) = self.ngram_range;

        if max_n <= 1 {
            return tokens;
        }

        let mut terms = Vec::new();
        for n in min_n.max(1)..=max_n {
            if n > tokens.len() {
                break;
            }
            if n == 1 {
                terms.extend(tokens.iter().cloned());
                continue;
            }
            terms.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}
