use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::{StorageBackend, StorageSettings};
use crate::core::{BlobStore, BoxError};
use crate::services::http_blob::HttpBlobStore;

/// Errors that can occur when reading or writing blobs
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Storage returned {status} for {key}")]
    Status { status: u16, key: String },

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Storage misconfigured: {0}")]
    Config(String),
}

/// Reject keys that could escape the bucket
pub(crate) fn validate_key(key: &str) -> Result<(), BlobError> {
    let invalid = key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key == "."
        || key == "..";

    if invalid {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Blob store on the local filesystem, one file per key under
/// `{root}/{bucket}`
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            dir: root.as_ref().join(bucket),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(key), bytes).await?;
        tracing::debug!("Wrote blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        validate_key(key)?;
        match tokio::fs::read(self.dir.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BoxError> {
        Ok(self.write(key, &bytes).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.read(key).await?)
    }
}

/// Blob store selected by configuration
pub enum BlobBackend {
    Fs(FsBlobStore),
    Http(HttpBlobStore),
}

impl BlobBackend {
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, BlobError> {
        match settings.backend {
            StorageBackend::Fs => {
                tracing::info!(
                    "Storing artifacts under {}/{}",
                    settings.root.display(),
                    settings.bucket
                );
                Ok(BlobBackend::Fs(FsBlobStore::new(&settings.root, &settings.bucket)))
            }
            StorageBackend::Http => {
                let endpoint = settings.endpoint.clone().ok_or_else(|| {
                    BlobError::Config("storage.endpoint is required for the http backend".into())
                })?;
                tracing::info!("Storing artifacts at {} bucket {}", endpoint, settings.bucket);

                let store = HttpBlobStore::new(
                    endpoint,
                    settings.bucket.clone(),
                    settings.access_token.clone(),
                    Duration::from_secs(settings.timeout_secs.unwrap_or(30)),
                )?;
                Ok(BlobBackend::Http(store))
            }
        }
    }
}

impl BlobStore for BlobBackend {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BoxError> {
        match self {
            BlobBackend::Fs(store) => store.put(key, bytes).await,
            BlobBackend::Http(store) => store.put(key, bytes).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        match self {
            BlobBackend::Fs(store) => store.get(key).await,
            BlobBackend::Http(store) => store.get(key).await,
        }
    }
}
