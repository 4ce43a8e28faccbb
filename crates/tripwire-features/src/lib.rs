//! Text features for the tripwire spam classifier.
//!
//! This crate turns raw message text and free-form labels into the numeric
//! inputs the trainer consumes, and owns the vocabulary document that ties a
//! trained model to its feature space.
//!
//! # Overview
//!
//! - **Labels**: [`LabelEncoder`] maps label strings to 0/1 with a
//!   case-insensitive positive-class pattern
//! - **Analysis**: [`Analyzer`] lower-cases, tokenizes, drops English stop
//!   words and builds n-grams
//! - **Vectorization**: [`TfidfVectorizer`] learns (or locks) a vocabulary and
//!   produces L2-normalised TF-IDF rows in a sparse [`FeatureMatrix`]
//! - **Persistence**: [`VocabularyDocument`] is the `tfidf_vocab.json` schema;
//!   [`VocabularySource`] also reads the legacy bare mapping
//!
//! # Quick Start
//!
//! ```rust
//! use tripwire_features::{LabelEncoder, TfidfVectorizer, VectorizerConfig};
//!
//! let texts = vec![
//!     "WIN a free prize now".to_string(),
//!     "free prize inside".to_string(),
//!     "lunch at noon?".to_string(),
//! ];
//! let raw_labels = ["scam", "Spam", "ham"];
//!
//! let encoding = LabelEncoder::default().encode(raw_labels.iter().map(|l| Some(*l)));
//! assert_eq!(encoding.labels(), &[1, 1, 0]);
//!
//! let mut vectorizer = TfidfVectorizer::learn(VectorizerConfig::default())?;
//! let features = vectorizer.fit_transform(&texts)?;
//! assert_eq!(features.n_rows(), 3);
//! # Ok::<(), tripwire_features::FeatureError>(())
//! ```

pub mod analyzer;
pub mod error;
pub mod labels;
pub mod matrix;
pub mod stop_words;
pub mod vectorizer;
pub mod vocabulary;

pub use analyzer::{Analyzer, StopWords};
pub use error::{FeatureError, Result};
pub use labels::{DEFAULT_POSITIVE_PATTERN, LabelEncoder, LabelEncoding, LabelSummary, MISSING_LABEL};
pub use matrix::{FeatureMatrix, SparseRow};
pub use stop_words::is_english_stop_word;
pub use vectorizer::{TfidfVectorizer, VectorizerConfig};
pub use vocabulary::{Vocabulary, VocabularyDocument, VocabularySource};
