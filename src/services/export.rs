use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::core::BoxError;
use crate::models::{ExportCursor, ExportRow};

/// Errors that can occur while building an export file
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export source error: {0}")]
    Source(#[source] BoxError),
}

/// Keyset-paginated read of every market with its rating aggregate
///
/// Rows come back ordered by `(name, market_id)`, strictly after `after`.
pub trait ExportSource: Send + Sync {
    fn fetch_export_chunk(
        &self,
        after: Option<&ExportCursor>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ExportRow>, BoxError>> + Send;
}

impl<T: ExportSource> ExportSource for Arc<T> {
    fn fetch_export_chunk(
        &self,
        after: Option<&ExportCursor>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ExportRow>, BoxError>> + Send {
        (**self).fetch_export_chunk(after, limit)
    }
}

const HEADER: [&str; 11] = [
    "market_id",
    "market_name",
    "street",
    "city",
    "state",
    "zip",
    "latitude",
    "longitude",
    "location",
    "avg_rating",
    "review_count",
];

/// Finished export waiting to be recorded and sent
pub struct ExportedFile {
    pub file: NamedTempFile,
    pub filename: String,
    pub rows: usize,
}

/// Download name for an export produced at `at`
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("all_markets_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

/// Streams the whole directory into a CSV file chunk by chunk
#[derive(Debug, Clone)]
pub struct BulkExporter {
    chunk_size: u32,
}

impl BulkExporter {
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write every market to a temporary CSV file
    ///
    /// Only one chunk is held in memory at a time. A chunk shorter than the
    /// chunk size ends the export.
    pub async fn export<S: ExportSource>(
        &self,
        source: &S,
        at: DateTime<Utc>,
    ) -> Result<ExportedFile, ExportError> {
        let file = tempfile::Builder::new()
            .prefix("all_markets_")
            .suffix(".csv")
            .tempfile()?;

        let mut writer = csv::Writer::from_writer(file.reopen()?);
        writer.write_record(HEADER)?;

        let mut cursor: Option<ExportCursor> = None;
        let mut rows = 0usize;

        loop {
            let chunk = source
                .fetch_export_chunk(cursor.as_ref(), self.chunk_size)
                .await
                .map_err(ExportError::Source)?;
            let fetched = chunk.len();

            for row in &chunk {
                writer.write_record(record_fields(row))?;
            }
            writer.flush()?;
            rows += fetched;

            tracing::debug!("Exported chunk of {} rows ({} total)", fetched, rows);

            if fetched < self.chunk_size as usize {
                break;
            }
            cursor = chunk.last().map(ExportCursor::from);
        }

        let mut inner = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
        inner.flush()?;

        Ok(ExportedFile {
            file,
            filename: export_filename(at),
            rows,
        })
    }
}

fn record_fields(row: &ExportRow) -> [String; 11] {
    let optional = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    [
        row.market_id.to_string(),
        row.name.clone(),
        row.street.clone(),
        row.city.clone(),
        row.region.clone(),
        row.zip.clone(),
        optional(row.latitude),
        optional(row.longitude),
        row.location.clone().unwrap_or_default(),
        format!("{:.2}", row.average_rating),
        row.review_count.to_string(),
    ]
}
