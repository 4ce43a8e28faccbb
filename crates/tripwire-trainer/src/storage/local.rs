//! Local filesystem backend.

use super::{Location, Storage};
use crate::error::{Result, TrainingError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes plain files.
///
/// Writes land in a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }

    fn path<'a>(&self, location: &'a Location) -> Result<&'a Path> {
        match location {
            Location::Local(path) => Ok(path),
            other => Err(TrainingError::UnsupportedLocation(other.to_string())),
        }
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

impl Storage for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    fn read(&self, location: &Location) -> Result<Vec<u8>> {
        let path = self.path(location)?;
        fs::read(path).map_err(|e| TrainingError::storage(location, e))
    }

    /// A missing directory lists as empty, like an unused GCS prefix.
    fn list(&self, location: &Location) -> Result<Vec<Location>> {
        let dir = self.path(location)?;
        let mut files = Vec::new();
        match collect_files(dir, &mut files) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TrainingError::storage(location, e)),
        }
        files.sort();
        debug!("Listed {} files under {}", files.len(), dir.display());
        Ok(files.into_iter().map(Location::Local).collect())
    }

    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        let path = self.path(location)?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| TrainingError::storage(location, e))?;

        let mut staged = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| TrainingError::storage(location, e))?;
        staged
            .write_all(bytes)
            .and_then(|_| staged.flush())
            .map_err(|e| TrainingError::storage(location, e))?;
        staged
            .persist(path)
            .map_err(|e| TrainingError::storage(location, e.error))?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn exists(&self, location: &Location) -> Result<bool> {
        Ok(self.path(location)?.is_file())
    }

    fn remove(&self, location: &Location) -> Result<()> {
        match fs::remove_file(self.path(location)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TrainingError::storage(location, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let target = Location::Local(dir.path().join("nested/deeper/model.bst"));

        storage.write(&target, b"{}").unwrap();
        assert!(storage.exists(&target).unwrap());
        assert_eq!(storage.read(&target).unwrap(), b"{}");

        storage.write(&target, b"[1]").unwrap();
        assert_eq!(storage.read(&target).unwrap(), b"[1]");

        storage.remove(&target).unwrap();
        assert!(!storage.exists(&target).unwrap());
        storage.remove(&target).unwrap();
    }

    #[test]
    fn test_list_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        for name in ["b.csv", "a.csv", "sub/c.CSV", "sub/notes.txt"] {
            storage
                .write(&Location::Local(dir.path().join(name)), b"x")
                .unwrap();
        }

        let names: Vec<String> = storage
            .list(&Location::Local(dir.path().to_path_buf()))
            .unwrap()
            .iter()
            .map(|l| l.file_name().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.CSV", "notes.txt"]);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let missing = Location::Local(dir.path().join("nope"));
        assert!(storage.list(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let err = storage
            .read(&Location::Local(dir.path().join("missing.csv")))
            .unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_rejects_gcs_location() {
        let storage = LocalStorage::new();
        let location = Location::parse("gs://bucket/x").unwrap();
        assert!(matches!(
            storage.exists(&location).unwrap_err(),
            TrainingError::UnsupportedLocation(_)
        ));
    }
}
