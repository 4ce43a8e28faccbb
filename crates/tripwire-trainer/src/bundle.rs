//! Artifact bundle: the three files a serving process loads together.
//!
//! | file | contents |
//! |---|---|
//! | `model.bst` | serialized [`Booster`] |
//! | `tfidf_vocab.json` | [`VocabularyDocument`] |
//! | `metadata.json` | [`BundleMetadata`], pretty-printed |
//!
//! Writing is a two-step transaction. [`ArtifactBundle::stage`] serializes
//! everything into a local temporary directory, so serialization failures
//! never touch the destination. [`StagedBundle::publish`] then copies the
//! files out through [`Storage`] and checks every file is visible at the
//! destination. Any failure puts the destination back the way it was.

use crate::booster::Booster;
use crate::error::{Result, ResultExt, TrainingError};
use crate::storage::{Location, Storage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use tripwire_features::{VocabularyDocument, VocabularySource};

pub const MODEL_FILE: &str = "model.bst";
pub const VOCABULARY_FILE: &str = "tfidf_vocab.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Every artifact, in publication order.
pub const ARTIFACT_FILES: [&str; 3] = [MODEL_FILE, VOCABULARY_FILE, METADATA_FILE];

/// Run metadata stored next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub label_column: String,
    pub text_column: String,
    pub pos_regex: String,
    /// Feature dimension; equals the vocabulary size.
    pub vec_dim: usize,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Serialized artifacts, ready to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    model: Vec<u8>,
    vocabulary: Vec<u8>,
    metadata: Vec<u8>,
}

impl ArtifactBundle {
    pub fn new(
        booster: &Booster,
        vocabulary: &VocabularyDocument,
        metadata: &BundleMetadata,
    ) -> Result<Self> {
        if vocabulary.vocabulary.len() != metadata.vec_dim {
            return Err(TrainingError::InvalidData(format!(
                "vocabulary has {} terms but vec_dim is {}",
                vocabulary.vocabulary.len(),
                metadata.vec_dim
            )));
        }
        Ok(Self {
            model: booster.to_bytes()?,
            vocabulary: vocabulary.to_json_bytes()?,
            metadata: serde_json::to_vec_pretty(metadata)?,
        })
    }

    /// `(file name, bytes)` pairs in publication order.
    pub fn artifacts(&self) -> [(&'static str, &[u8]); 3] {
        [
            (MODEL_FILE, self.model.as_slice()),
            (VOCABULARY_FILE, self.vocabulary.as_slice()),
            (METADATA_FILE, self.metadata.as_slice()),
        ]
    }

    /// Write every artifact into a fresh temporary directory.
    pub fn stage(&self) -> Result<StagedBundle> {
        let dir = tempfile::Builder::new()
            .prefix("tripwire-bundle-")
            .tempdir()?;
        let mut files = Vec::with_capacity(ARTIFACT_FILES.len());
        for (name, bytes) in self.artifacts() {
            let path = dir.path().join(name);
            fs::write(&path, bytes)?;
            files.push((name, path));
        }
        debug!("Staged bundle in {}", dir.path().display());
        Ok(StagedBundle { dir, files })
    }
}

/// Artifacts staged on local disk. The directory is deleted on drop.
#[derive(Debug)]
pub struct StagedBundle {
    dir: TempDir,
    files: Vec<(&'static str, PathBuf)>,
}

impl StagedBundle {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copy every staged artifact to `destination`, all or nothing.
    ///
    /// Whatever the destination held before is read back first. If any
    /// write or the final visibility check fails, each file this call
    /// touched is restored to its prior contents, or removed if it did not
    /// exist, so an earlier bundle survives a failed republish.
    pub fn publish(&self, storage: &dyn Storage, destination: &Location) -> Result<Vec<Location>> {
        let targets: Vec<Location> = self
            .files
            .iter()
            .map(|(name, _)| destination.join(name))
            .collect();
        let previous = snapshot(storage, &targets)
            .context(format!("Backing up existing bundle at {}", destination))?;

        let mut written = 0;
        let outcome = self
            .copy_out(storage, &targets, &mut written)
            .and_then(|()| verify(storage, &targets, &self.files));

        if let Err(e) = outcome {
            warn!(
                "Publishing to {} failed; restoring {} artifact(s)",
                destination, written
            );
            restore(storage, &targets[..written], &previous[..written]);
            return Err(e.with_context(format!("Publishing bundle to {}", destination)));
        }
        Ok(targets)
    }

    fn copy_out(
        &self,
        storage: &dyn Storage,
        targets: &[Location],
        written: &mut usize,
    ) -> Result<()> {
        for ((name, path), target) in self.files.iter().zip(targets) {
            let bytes = fs::read(path)?;
            // counted before the write: a failed write may still leave bytes behind
            *written += 1;
            storage.write(target, &bytes)?;
            info!("Saved {} to {}", name, target);
        }
        Ok(())
    }
}

fn snapshot(storage: &dyn Storage, targets: &[Location]) -> Result<Vec<Option<Vec<u8>>>> {
    targets
        .iter()
        .map(|target| {
            if storage.exists(target)? {
                debug!("Backing up {}", target);
                storage.read(target).map(Some)
            } else {
                Ok(None)
            }
        })
        .collect()
}

fn verify(
    storage: &dyn Storage,
    targets: &[Location],
    files: &[(&'static str, PathBuf)],
) -> Result<()> {
    for (target, (name, _)) in targets.iter().zip(files) {
        if !storage
            .exists(target)
            .context(format!("Verifying {}", target))?
        {
            return Err(TrainingError::BundleIncomplete(name.to_string()));
        }
    }
    Ok(())
}

fn restore(storage: &dyn Storage, targets: &[Location], previous: &[Option<Vec<u8>>]) {
    for (target, prior) in targets.iter().zip(previous) {
        let undone = match prior {
            Some(bytes) => storage.write(target, bytes),
            None => storage.remove(target),
        };
        if let Err(e) = undone {
            warn!("Could not restore {}: {}", target, e);
        }
    }
}

/// Stage and publish in one step.
pub fn write_bundle(
    storage: &dyn Storage,
    destination: &Location,
    bundle: &ArtifactBundle,
) -> Result<Vec<Location>> {
    bundle.stage()?.publish(storage, destination)
}

/// A bundle read back from storage.
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub booster: Booster,
    pub vocabulary: VocabularySource,
    pub metadata: BundleMetadata,
}

/// Read and parse all three artifacts under `location`.
pub fn read_bundle(storage: &dyn Storage, location: &Location) -> Result<LoadedBundle> {
    let booster = Booster::from_bytes(&storage.read(&location.join(MODEL_FILE))?)?;
    let vocabulary = VocabularySource::parse(&storage.read(&location.join(VOCABULARY_FILE))?)?;
    let metadata = serde_json::from_slice(&storage.read(&location.join(METADATA_FILE))?)?;
    Ok(LoadedBundle {
        booster,
        vocabulary,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booster::{BoosterParams, LabeledMatrix};
    use crate::storage::LocalStorage;
    use parking_lot::Mutex;
    use tripwire_features::{FeatureMatrix, StopWords};

    /// Local storage that fails its n-th write and can hide one file name.
    struct FaultyStorage {
        inner: LocalStorage,
        fail_on_write: Option<usize>,
        hidden: Option<&'static str>,
        writes: Mutex<usize>,
    }

    impl FaultyStorage {
        fn new(fail_on_write: Option<usize>, hidden: Option<&'static str>) -> Self {
            Self {
                inner: LocalStorage::new(),
                fail_on_write,
                hidden,
                writes: Mutex::new(0),
            }
        }
    }

    impl Storage for FaultyStorage {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn read(&self, location: &Location) -> Result<Vec<u8>> {
            self.inner.read(location)
        }

        fn list(&self, location: &Location) -> Result<Vec<Location>> {
            self.inner.list(location)
        }

        fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
            let mut writes = self.writes.lock();
            *writes += 1;
            if self.fail_on_write == Some(*writes) {
                return Err(TrainingError::storage(location, "connection reset"));
            }
            self.inner.write(location, bytes)
        }

        fn exists(&self, location: &Location) -> Result<bool> {
            if self.hidden.is_some() && location.file_name() == self.hidden {
                return Ok(false);
            }
            self.inner.exists(location)
        }

        fn remove(&self, location: &Location) -> Result<()> {
            self.inner.remove(location)
        }
    }

    fn sample_bundle() -> ArtifactBundle {
        let x = FeatureMatrix::from_dense(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let y = [1u8, 0];
        let params = BoosterParams {
            num_rounds: 2,
            ..BoosterParams::default()
        };
        let booster =
            Booster::train(&params, 1.0, &LabeledMatrix::new(&x, &y).unwrap(), None).unwrap();
        let vocabulary = VocabularyDocument {
            vocabulary: [("free".to_string(), 0), ("win".to_string(), 1)].into(),
            ngram_range: [1, 2],
            max_features: None,
            min_df: 2,
            lowercase: true,
            stop_words: Some(StopWords::English),
        };
        let metadata = BundleMetadata {
            label_column: "label".to_string(),
            text_column: "text".to_string(),
            pos_regex: "(spam|scam)".to_string(),
            vec_dim: 2,
            f1: 0.9,
            precision: 0.8,
            recall: 1.0,
        };
        ArtifactBundle::new(&booster, &vocabulary, &metadata).unwrap()
    }

    #[test]
    fn test_stage_writes_all_files() {
        let staged = sample_bundle().stage().unwrap();
        for name in ARTIFACT_FILES {
            assert!(staged.path().join(name).is_file(), "{name} not staged");
        }
    }

    #[test]
    fn test_publish_and_read_back() {
        let dest_dir = tempfile::tempdir().unwrap();
        let destination = Location::Local(dest_dir.path().join("model"));
        let storage = LocalStorage::new();

        let written = write_bundle(&storage, &destination, &sample_bundle()).unwrap();
        assert_eq!(written.len(), 3);

        let loaded = read_bundle(&storage, &destination).unwrap();
        assert_eq!(loaded.metadata.vec_dim, 2);
        assert_eq!(loaded.vocabulary.into_vocabulary().unwrap().len(), 2);
        assert_eq!(loaded.booster.num_features(), 2);
    }

    #[test]
    fn test_metadata_is_pretty_json() {
        let bundle = sample_bundle();
        let (_, bytes) = bundle.artifacts()[2];
        let text = std::str::from_utf8(bytes).unwrap();
        assert!(text.contains("\n  \"vec_dim\": 2"));
    }

    #[test]
    fn test_vec_dim_must_match_vocabulary() {
        let bundle = sample_bundle();
        let (_, model) = bundle.artifacts()[0];
        let booster = Booster::from_bytes(model).unwrap();
        let vocabulary = VocabularyDocument {
            vocabulary: [("free".to_string(), 0)].into(),
            ngram_range: [1, 2],
            max_features: None,
            min_df: 1,
            lowercase: true,
            stop_words: Some(StopWords::English),
        };
        let metadata = BundleMetadata {
            label_column: "label".to_string(),
            text_column: "text".to_string(),
            pos_regex: "x".to_string(),
            vec_dim: 2,
            f1: 0.0,
            precision: 0.0,
            recall: 0.0,
        };
        assert!(ArtifactBundle::new(&booster, &vocabulary, &metadata).is_err());
    }

    #[test]
    fn test_failed_write_restores_previous_bundle() {
        let dest_dir = tempfile::tempdir().unwrap();
        let model_dir = dest_dir.path().join("model");
        fs::create_dir_all(&model_dir).unwrap();
        for name in ARTIFACT_FILES {
            fs::write(model_dir.join(name), format!("previous {name}")).unwrap();
        }

        let storage = FaultyStorage::new(Some(2), None);
        let err = write_bundle(&storage, &Location::Local(model_dir.clone()), &sample_bundle())
            .unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");

        for name in ARTIFACT_FILES {
            assert_eq!(
                fs::read_to_string(model_dir.join(name)).unwrap(),
                format!("previous {name}")
            );
        }
    }

    #[test]
    fn test_invisible_artifact_rolls_back_publication() {
        let dest_dir = tempfile::tempdir().unwrap();
        let model_dir = dest_dir.path().join("model");

        let storage = FaultyStorage::new(None, Some(METADATA_FILE));
        let err = write_bundle(&storage, &Location::Local(model_dir.clone()), &sample_bundle())
            .unwrap_err();
        assert_eq!(err.error_code(), "BUNDLE_INCOMPLETE");

        for name in ARTIFACT_FILES {
            assert!(!model_dir.join(name).exists(), "{name} left behind");
        }
    }
}
