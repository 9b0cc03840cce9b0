//! File provenance ledger
//!
//! Every file that enters or leaves the service is stored under a generated,
//! content-unlinkable name and recorded in an append-only audit log. The blob
//! upload and the audit insert are two independent writes: an upload failure
//! leaves no trace, while an audit failure after a successful upload leaves an
//! orphan blob that is deliberately not rolled back.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::core::BoxError;
use crate::models::{ArtifactRecord, OperationKind};

/// Errors that can occur while recording an artifact
#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("File name '{0}' has no extension")]
    MissingExtension(String),

    #[error("Storage error: {0}")]
    Storage(#[source] BoxError),

    #[error("Audit log error: {0}")]
    Audit(#[source] BoxError),
}

/// Key/value store for artifact bytes
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: Vec<u8>) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, BoxError>> + Send;
}

/// Append-only sink for audit rows
pub trait AuditStore: Send + Sync {
    fn insert(&self, record: &ArtifactRecord) -> impl Future<Output = Result<(), BoxError>> + Send;
}

impl<T: BlobStore> BlobStore for Arc<T> {
    fn put(&self, key: &str, bytes: Vec<u8>) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).put(key, bytes)
    }

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, BoxError>> + Send {
        (**self).get(key)
    }
}

impl<T: AuditStore> AuditStore for Arc<T> {
    fn insert(&self, record: &ArtifactRecord) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).insert(record)
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type IdSource = Box<dyn Fn() -> Uuid + Send + Sync>;

/// Extract the lower-cased extension of `filename`, including the leading dot
///
/// Dot-files such as `.env` and names ending in a bare dot have no extension.
pub fn file_extension(filename: &str) -> Result<String, ProvenanceError> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .ok_or_else(|| ProvenanceError::MissingExtension(filename.to_string()))
}

/// Build the storage name for an artifact
///
/// `sha256("{id}-{timestamp}-{origin}")` in lowercase hex, followed by the
/// extension. Deterministic for fixed inputs.
pub fn generate_name(id: Uuid, at: DateTime<Utc>, origin: &str, extension: &str) -> String {
    let input = format!("{}-{}-{}", id, at.format("%Y-%m-%dT%H:%M:%S%.6f"), origin);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{}{}", hex::encode(hasher.finalize()), extension)
}

/// Persists artifacts and records their provenance
pub struct ProvenanceLedger<B, A> {
    blobs: Arc<B>,
    audit: Arc<A>,
    clock: Clock,
    ids: IdSource,
}

impl<B: BlobStore, A: AuditStore> ProvenanceLedger<B, A> {
    pub fn new(blobs: Arc<B>, audit: Arc<A>) -> Self {
        Self {
            blobs,
            audit,
            clock: Box::new(Utc::now),
            ids: Box::new(Uuid::new_v4),
        }
    }

    /// Replace the wall clock, e.g. with a fixed sequence in tests
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the random identifier source
    pub fn with_id_source(mut self, ids: impl Fn() -> Uuid + Send + Sync + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Store the file at `local_path` and append an audit row for it
    ///
    /// Returns the generated storage name. Every call creates a new entry,
    /// even for identical inputs.
    pub async fn record(
        &self,
        local_path: &Path,
        original_filename: &str,
        kind: OperationKind,
        requester_origin: &str,
    ) -> Result<String, ProvenanceError> {
        let extension = file_extension(original_filename)?;

        let now = (self.clock)();
        let generated_name = generate_name((self.ids)(), now, requester_origin, &extension);

        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| ProvenanceError::Storage(e.into()))?;
        let size = bytes.len();

        self.blobs
            .put(&generated_name, bytes)
            .await
            .map_err(ProvenanceError::Storage)?;

        let record = ArtifactRecord {
            original_filename: original_filename.to_string(),
            generated_name: generated_name.clone(),
            operation_kind: kind,
            source_extension: extension,
            requester_origin: requester_origin.to_string(),
            created_at: now,
        };

        if let Err(e) = self.audit.insert(&record).await {
            tracing::error!(
                "Stored {} but failed to log it, blob left without audit row: {}",
                generated_name,
                e
            );
            return Err(ProvenanceError::Audit(e));
        }

        tracing::info!(
            "Recorded {} artifact {} as {} ({} bytes, origin {})",
            kind,
            original_filename,
            generated_name,
            size,
            requester_origin
        );

        Ok(generated_name)
    }
}
