//! Corpus discovery and loading.
//!
//! Data exports land either as a single CSV or as a directory of files. The
//! resolver turns either shape into exactly one CSV, preferring the canonical
//! `spam_converted.csv` export when several are present.

use crate::error::{Result, ResultExt, TrainingError};
use crate::storage::{Location, Storage};
use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// File name preferred when a directory holds several CSVs.
pub const CANONICAL_CORPUS_NAME: &str = "spam_converted.csv";

/// Text and raw labels of one corpus, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    pub texts: Vec<String>,
    pub raw_labels: Vec<Option<String>>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// A location whose last segment has an extension reads as a file name.
///
/// A leading dot alone is not an extension, so hidden directories such as
/// `.tmpXYZ` are still searched.
fn looks_like_file(location: &Location) -> bool {
    location
        .file_name()
        .is_some_and(|name| Path::new(name).extension().is_some())
}

fn is_csv(location: &Location) -> bool {
    location
        .file_name()
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".csv"))
}

/// Pick the single CSV to train on.
///
/// A location whose last segment carries an extension is the corpus itself
/// and must exist. So is an existing object without one. Anything else is
/// listed as a directory (or object prefix) and the canonical export wins,
/// else the first CSV in lexicographic order.
pub fn resolve_corpus(storage: &dyn Storage, location: &Location) -> Result<Location> {
    if looks_like_file(location) {
        if !storage.exists(location)? {
            return Err(TrainingError::CorpusNotFound(location.to_string()));
        }
        debug!("Corpus location is a file: {}", location);
        return Ok(location.clone());
    }
    if storage.exists(location)? {
        debug!("Corpus location is a file without extension: {}", location);
        return Ok(location.clone());
    }

    let mut candidates: Vec<Location> = storage
        .list(location)
        .context(format!("Listing corpus directory {}", location))?
        .into_iter()
        .filter(is_csv)
        .collect();
    candidates.sort_by_key(|c| c.to_string());

    debug!("Found {} CSV candidates under {}", candidates.len(), location);

    let preferred = candidates.iter().position(|c| {
        c.file_name()
            .is_some_and(|name| name.ends_with(CANONICAL_CORPUS_NAME))
    });

    let chosen = match preferred {
        Some(idx) => candidates.swap_remove(idx),
        None if !candidates.is_empty() => candidates.swap_remove(0),
        None => return Err(TrainingError::NoCsvFound(location.to_string())),
    };

    info!("Resolved corpus {} -> {}", location, chosen);
    Ok(chosen)
}

/// Read one CSV and extract the text and label columns.
pub fn load_corpus(
    storage: &dyn Storage,
    location: &Location,
    text_column: &str,
    label_column: &str,
) -> Result<Corpus> {
    let bytes = storage.read(location)?;
    info!("Loading CSV from: {} ({} bytes)", location, bytes.len());

    // No inference: every column stays a string, whatever the first rows hold.
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .context(format!("Parsing CSV {}", location))?;

    let missing: Vec<String> = [text_column, label_column]
        .into_iter()
        .filter(|name| df.get_column_index(name).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(TrainingError::MissingColumns {
            missing,
            available: df
                .get_column_names()
                .iter()
                .map(|name| name.to_string())
                .collect(),
        });
    }

    let texts = string_column(&df, text_column)?
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
    let raw_labels = string_column(&df, label_column)?;

    info!("Dataset loaded successfully: {:?}", df.shape());
    Ok(Corpus { texts, raw_labels })
}

/// A column rendered as strings; nulls stay `None`.
fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)
        .context(format!("Casting column '{}' to string", name))?;
    let values = series.str()?;
    Ok(values
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn write(dir: &Path, name: &str, contents: &str) {
        LocalStorage::new()
            .write(&Location::Local(dir.join(name)), contents.as_bytes())
            .unwrap();
    }

    #[test]
    fn test_resolve_prefers_canonical_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", "text,label\n");
        write(dir.path(), "spam_converted.csv", "text,label\n");

        let chosen = resolve_corpus(&LocalStorage::new(), &Location::Local(dir.path().into())).unwrap();
        assert_eq!(chosen.file_name(), Some("spam_converted.csv"));
    }

    #[test]
    fn test_resolve_falls_back_to_first_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.csv", "text,label\n");
        write(dir.path(), "a.csv", "text,label\n");
        write(dir.path(), "README.md", "notes");

        let chosen = resolve_corpus(&LocalStorage::new(), &Location::Local(dir.path().into())).unwrap();
        assert_eq!(chosen.file_name(), Some("a.csv"));
    }

    #[test]
    fn test_resolve_searches_recursively_and_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "exports/2024/DATA.CSV", "text,label\n");

        let chosen = resolve_corpus(&LocalStorage::new(), &Location::Local(dir.path().into())).unwrap();
        assert_eq!(chosen.file_name(), Some("DATA.CSV"));
    }

    #[test]
    fn test_resolve_no_csv() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", "nothing here");

        let err = resolve_corpus(&LocalStorage::new(), &Location::Local(dir.path().into())).unwrap_err();
        assert!(matches!(err, TrainingError::NoCsvFound(_)));
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::Local(dir.path().join("missing.csv"));
        let err = resolve_corpus(&LocalStorage::new(), &location).unwrap_err();
        assert!(matches!(err, TrainingError::CorpusNotFound(_)));
    }

    #[test]
    fn test_load_corpus_handles_quotes_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "corpus.csv",
            "id,text,label\n1,\"Win, a prize\",spam\n2,,ham\n3,hello there,\n",
        );
        let location = Location::Local(dir.path().join("corpus.csv"));

        let corpus = load_corpus(&LocalStorage::new(), &location, "text", "label").unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.texts, vec!["Win, a prize", "", "hello there"]);
        assert_eq!(
            corpus.raw_labels,
            vec![Some("spam".to_string()), Some("ham".to_string()), None]
        );
    }

    #[test]
    fn test_load_corpus_coerces_numeric_labels() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus.csv", "text,label\nfree money,1\nlunch,0\n");
        let location = Location::Local(dir.path().join("corpus.csv"));

        let corpus = load_corpus(&LocalStorage::new(), &location, "text", "label").unwrap();
        assert_eq!(
            corpus.raw_labels,
            vec![Some("1".to_string()), Some("0".to_string())]
        );
    }

    #[test]
    fn test_resolve_dotted_name_is_a_file_even_when_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "export.v2/a.csv", "text,label\n");

        let location = Location::Local(dir.path().join("export.v2"));
        let err = resolve_corpus(&LocalStorage::new(), &location).unwrap_err();
        assert!(matches!(err, TrainingError::CorpusNotFound(_)));
    }

    #[test]
    fn test_resolve_existing_file_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus", "text,label\n");

        let location = Location::Local(dir.path().join("corpus"));
        let chosen = resolve_corpus(&LocalStorage::new(), &location).unwrap();
        assert_eq!(chosen, location);
    }

    #[test]
    fn test_load_corpus_keeps_late_string_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("text,label\n");
        for i in 0..120 {
            csv.push_str(&format!("message {},{}\n", i, i % 2));
        }
        for i in 0..10 {
            csv.push_str(&format!("claim prize {},spam\n", i));
        }
        write(dir.path(), "corpus.csv", &csv);
        let location = Location::Local(dir.path().join("corpus.csv"));

        let corpus = load_corpus(&LocalStorage::new(), &location, "text", "label").unwrap();
        assert_eq!(corpus.len(), 130);
        assert_eq!(corpus.raw_labels[1].as_deref(), Some("1"));
        assert_eq!(corpus.raw_labels[129].as_deref(), Some("spam"));
    }

    #[test]
    fn test_load_corpus_reports_all_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus.csv", "body,category\nhi,ham\n");
        let location = Location::Local(dir.path().join("corpus.csv"));

        let err = load_corpus(&LocalStorage::new(), &location, "text", "label").unwrap_err();
        match err {
            TrainingError::MissingColumns { missing, available } => {
                assert_eq!(missing, vec!["text", "label"]);
                assert_eq!(available, vec!["body", "category"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
