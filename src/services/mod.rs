// Service exports
pub mod blob;
pub mod cache;
pub mod export;
pub mod http_blob;
pub mod memory;
pub mod postgres;

pub use blob::{BlobBackend, BlobError, FsBlobStore};
pub use cache::CachedRatings;
pub use export::{export_filename, BulkExporter, ExportError, ExportSource, ExportedFile};
pub use http_blob::HttpBlobStore;
pub use memory::{MemoryAuditLog, MemoryBlobStore, MemoryExportSource, MemoryMarkets};
pub use postgres::{PostgresClient, PostgresError};
