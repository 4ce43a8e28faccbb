//! Google Cloud Storage backend over the JSON API.
//!
//! Authentication uses a bearer token taken from `GOOGLE_OAUTH_ACCESS_TOKEN`
//! when set, otherwise fetched (and cached until shortly before expiry) from
//! the instance metadata server, which is what a managed training job runs
//! against. `STORAGE_EMULATOR_HOST` redirects every call to an emulator and
//! skips authentication.

use super::{Location, Storage};
use crate::error::{Result, TrainingError};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
const EMULATOR_ENV: &str = "STORAGE_EMULATOR_HOST";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Refresh cached tokens this long before they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Connection settings for [`GcsStorage`].
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// API root. Default: "https://storage.googleapis.com"
    pub base_url: String,
    /// Request timeout in seconds. Default: 120
    pub timeout_secs: u64,
    /// Send no `Authorization` header (emulators).
    pub anonymous: bool,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            anonymous: false,
        }
    }
}

impl GcsConfig {
    /// Defaults, redirected to `STORAGE_EMULATOR_HOST` when it is set.
    pub fn from_env() -> Self {
        match std::env::var(EMULATOR_ENV) {
            Ok(host) if !host.trim().is_empty() => {
                let host = host.trim().trim_end_matches('/');
                let base_url = if host.contains("://") {
                    host.to_string()
                } else {
                    format!("http://{}", host)
                };
                Self {
                    base_url,
                    anonymous: true,
                    ..Self::default()
                }
            }
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

/// Blocking GCS client.
pub struct GcsStorage {
    config: GcsConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl GcsStorage {
    /// Create a client configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_config(GcsConfig::from_env())
    }

    pub fn with_config(config: GcsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!("GCS storage at {}", config.base_url);
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    fn parts<'a>(&self, location: &'a Location) -> Result<(&'a str, &'a str)> {
        match location {
            Location::Gcs { bucket, object } => Ok((bucket, object)),
            other => Err(TrainingError::UnsupportedLocation(other.to_string())),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            TrainingError::InvalidConfig(format!("bad GCS base url '{}': {}", self.config.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                TrainingError::InvalidConfig(format!(
                    "GCS base url '{}' cannot take a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<Url> {
        self.url(&["storage", "v1", "b", bucket, "o", object])
    }

    fn access_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }

        let mut cached = self.token.lock();
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        debug!("Fetching access token from metadata server");
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()?;
        if !response.status().is_success() {
            return Err(TrainingError::storage(
                METADATA_TOKEN_URL,
                format!("metadata server returned {}", response.status()),
            ));
        }
        let token: TokenResponse = response.json()?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = if self.config.anonymous {
            request
        } else {
            request.bearer_auth(self.access_token()?)
        };
        Ok(request.send()?)
    }

    fn failure(location: &Location, response: Response) -> TrainingError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        TrainingError::storage(location, format!("GCS returned {}: {}", status, body.trim()))
    }
}

impl Storage for GcsStorage {
    fn name(&self) -> &'static str {
        "gcs"
    }

    fn read(&self, location: &Location) -> Result<Vec<u8>> {
        let (bucket, object) = self.parts(location)?;
        let mut url = self.object_url(bucket, object)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.send(self.client.get(url))?;
        if !response.status().is_success() {
            return Err(Self::failure(location, response));
        }
        let bytes = response.bytes()?;
        debug!("Read {} bytes from {}", bytes.len(), location);
        Ok(bytes.to_vec())
    }

    fn list(&self, location: &Location) -> Result<Vec<Location>> {
        let (bucket, object) = self.parts(location)?;
        let prefix = match object.trim_end_matches('/') {
            "" => String::new(),
            trimmed => format!("{}/", trimmed),
        };

        let mut found = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.url(&["storage", "v1", "b", bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                if !prefix.is_empty() {
                    query.append_pair("prefix", &prefix);
                }
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(self.client.get(url))?;
            if !response.status().is_success() {
                return Err(Self::failure(location, response));
            }
            let page: ObjectList = response.json()?;
            found.extend(
                page.items
                    .into_iter()
                    .filter(|item| !item.name.ends_with('/'))
                    .map(|item| Location::Gcs {
                        bucket: bucket.to_string(),
                        object: item.name,
                    }),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        found.sort();
        debug!("Listed {} objects under {}", found.len(), location);
        Ok(found)
    }

    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        let (bucket, object) = self.parts(location)?;
        let mut url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);

        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec());
        let response = self.send(request)?;
        if !response.status().is_success() {
            return Err(Self::failure(location, response));
        }
        debug!("Uploaded {} bytes to {}", bytes.len(), location);
        Ok(())
    }

    fn exists(&self, location: &Location) -> Result<bool> {
        let (bucket, object) = self.parts(location)?;
        // Prefixes are never objects.
        if object.is_empty() || object.ends_with('/') {
            return Ok(false);
        }
        let response = self.send(self.client.get(self.object_url(bucket, object)?))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::failure(location, response)),
        }
    }

    fn remove(&self, location: &Location) -> Result<()> {
        let (bucket, object) = self.parts(location)?;
        let response = self.send(self.client.delete(self.object_url(bucket, object)?))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::failure(location, response)),
        }
    }
}
