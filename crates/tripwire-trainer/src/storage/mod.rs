//! Storage backends for corpus input and bundle output.
//!
//! A run reads its corpus and optional vocabulary from, and publishes its
//! bundle to, either the local filesystem or Google Cloud Storage. Both sit
//! behind the [`Storage`] trait; [`StorageRouter`] picks the backend from the
//! location scheme.
//!
//! # Locations
//!
//! - `/data/corpus.csv`, `./out`: [`Location::Local`]
//! - `gs://bucket/exports/corpus.csv`: [`Location::Gcs`]

pub mod local;

#[cfg(feature = "gcs")]
pub mod gcs;

pub use local::LocalStorage;

#[cfg(feature = "gcs")]
pub use gcs::GcsStorage;

use crate::error::{Result, TrainingError};
use std::fmt;
use std::path::PathBuf;

const GCS_SCHEME: &str = "gs://";

/// Where a corpus, vocabulary or artifact lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Local(PathBuf),
    /// `object` is the name inside the bucket, without a leading slash; empty
    /// for the bucket root.
    Gcs { bucket: String, object: String },
}

impl Location {
    /// Parse a local path or a `gs://bucket/object` URI.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TrainingError::InvalidConfig("empty location".to_string()));
        }

        if let Some(rest) = raw.strip_prefix(GCS_SCHEME) {
            let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(TrainingError::InvalidConfig(format!(
                    "'{}' does not name a bucket",
                    raw
                )));
            }
            return Ok(Location::Gcs {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }

        if raw.contains("://") {
            return Err(TrainingError::UnsupportedLocation(raw.to_string()));
        }

        Ok(Location::Local(PathBuf::from(raw)))
    }

    /// A child of this location, treating it as a directory.
    pub fn join(&self, name: &str) -> Self {
        match self {
            Location::Local(path) => Location::Local(path.join(name)),
            Location::Gcs { bucket, object } => {
                let prefix = object.trim_end_matches('/');
                let object = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", prefix, name)
                };
                Location::Gcs {
                    bucket: bucket.clone(),
                    object,
                }
            }
        }
    }

    /// Final path segment, ignoring a trailing slash.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Location::Local(path) => path.file_name().and_then(|n| n.to_str()),
            Location::Gcs { object, .. } => object
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty()),
        }
    }

    pub fn is_gcs(&self) -> bool {
        matches!(self, Location::Gcs { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Gcs { bucket, object } => write!(f, "{}{}/{}", GCS_SCHEME, bucket, object),
        }
    }
}

/// Blocking object/file access.
///
/// Implementations only need to handle the location kinds they are routed;
/// anything else is an [`TrainingError::UnsupportedLocation`].
pub trait Storage: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Full contents of one object.
    fn read(&self, location: &Location) -> Result<Vec<u8>>;

    /// Every object under a directory or prefix, recursively.
    fn list(&self, location: &Location) -> Result<Vec<Location>>;

    /// Create or replace one object.
    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()>;

    fn exists(&self, location: &Location) -> Result<bool>;

    /// Delete one object. Deleting a missing object is not an error.
    fn remove(&self, location: &Location) -> Result<()>;
}

/// Dispatches each call to the backend for the location's scheme.
pub struct StorageRouter {
    local: LocalStorage,
    #[cfg(feature = "gcs")]
    gcs: GcsStorage,
}

impl StorageRouter {
    /// # Errors
    ///
    /// Returns an error if the GCS HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            local: LocalStorage::new(),
            #[cfg(feature = "gcs")]
            gcs: GcsStorage::new()?,
        })
    }

    fn backend(&self, location: &Location) -> Result<&dyn Storage> {
        match location {
            Location::Local(_) => Ok(&self.local),
            #[cfg(feature = "gcs")]
            Location::Gcs { .. } => Ok(&self.gcs),
            #[cfg(not(feature = "gcs"))]
            Location::Gcs { .. } => Err(TrainingError::UnsupportedLocation(format!(
                "{} (built without the 'gcs' feature)",
                location
            ))),
        }
    }
}

impl Storage for StorageRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    fn read(&self, location: &Location) -> Result<Vec<u8>> {
        self.backend(location)?.read(location)
    }

    fn list(&self, location: &Location) -> Result<Vec<Location>> {
        self.backend(location)?.list(location)
    }

    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        self.backend(location)?.write(location, bytes)
    }

    fn exists(&self, location: &Location) -> Result<bool> {
        self.backend(location)?.exists(location)
    }

    fn remove(&self, location: &Location) -> Result<()> {
        self.backend(location)?.remove(location)
    }
}
