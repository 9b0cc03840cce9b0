//! In-memory collaborators for tests, benchmarks and local runs without a
//! database. Each one counts its calls and can be switched into a failing
//! state.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::{
    fold, is_within_bounding_box, matches_exact_field, AuditStore, BlobStore, BoxError,
    RatingLookup, RowFilter, RowSource,
};
use crate::models::{ArtifactRecord, ExportCursor, ExportRow, MarketRow};
use crate::services::export::ExportSource;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(what: &str) -> BoxError {
    format!("{} unavailable", what).into()
}

/// Market rows and ratings held in memory
#[derive(Default)]
pub struct MemoryMarkets {
    rows: Vec<MarketRow>,
    ratings: HashMap<String, f64>,
    fetches: AtomicUsize,
    rating_lookups: AtomicUsize,
    last_filter: Mutex<Option<RowFilter>>,
    last_rating_request: Mutex<Option<BTreeSet<String>>>,
    fail_fetch: AtomicBool,
    fail_ratings: AtomicBool,
}

impl MemoryMarkets {
    pub fn new(rows: Vec<MarketRow>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn with_rating(mut self, name: &str, rating: f64) -> Self {
        self.ratings.insert(name.to_string(), rating);
        self
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rating_lookups(&self, fail: bool) {
        self.fail_ratings.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn rating_lookups(&self) -> usize {
        self.rating_lookups.load(Ordering::SeqCst)
    }

    pub fn last_filter(&self) -> Option<RowFilter> {
        lock(&self.last_filter).clone()
    }

    pub fn last_rating_request(&self) -> Option<BTreeSet<String>> {
        lock(&self.last_rating_request).clone()
    }

    fn select(&self, filter: &RowFilter) -> Vec<MarketRow> {
        self.rows
            .iter()
            .filter(|row| match filter {
                RowFilter::All => true,
                RowFilter::FieldEquals(field, value) => {
                    matches_exact_field(row, *field, &fold(value))
                }
                // Rows without coordinates can never be inside a radius
                RowFilter::Within(bbox) => row
                    .coordinate()
                    .map(|c| is_within_bounding_box(c, bbox))
                    .unwrap_or(false),
            })
            .cloned()
            .collect()
    }
}

impl RowSource for MemoryMarkets {
    async fn fetch_markets(&self, filter: &RowFilter) -> Result<Vec<MarketRow>, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_filter) = Some(filter.clone());

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(injected("market store"));
        }

        Ok(self.select(filter))
    }
}

impl RatingLookup for MemoryMarkets {
    async fn average_ratings_for(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, BoxError> {
        self.rating_lookups.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_rating_request) = Some(names.clone());

        if self.fail_ratings.load(Ordering::SeqCst) {
            return Err(injected("rating store"));
        }

        Ok(names
            .iter()
            .filter_map(|name| self.ratings.get(name).map(|r| (name.clone(), *r)))
            .collect())
    }
}

/// Blob store backed by a map
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.blobs).contains_key(key)
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BoxError> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(injected("blob store"));
        }

        lock(&self.blobs).insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(lock(&self.blobs).get(key).cloned())
    }
}

/// Append-only audit log held in a vector
#[derive(Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<ArtifactRecord>>,
    fail_inserts: AtomicBool,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ArtifactRecord> {
        lock(&self.records).clone()
    }

    pub fn find(&self, generated_name: &str) -> Option<ArtifactRecord> {
        lock(&self.records)
            .iter()
            .find(|r| r.generated_name == generated_name)
            .cloned()
    }
}

impl AuditStore for MemoryAuditLog {
    async fn insert(&self, record: &ArtifactRecord) -> Result<(), BoxError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected("audit log"));
        }

        let mut records = lock(&self.records);
        if records.iter().any(|r| r.generated_name == record.generated_name) {
            return Err(format!("duplicate generated name {}", record.generated_name).into());
        }
        records.push(record.clone());
        Ok(())
    }
}

/// Export rows served in keyset order
#[derive(Default)]
pub struct MemoryExportSource {
    rows: Vec<ExportRow>,
    chunk_reads: AtomicUsize,
}

impl MemoryExportSource {
    pub fn new(mut rows: Vec<ExportRow>) -> Self {
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.market_id.cmp(&b.market_id)));
        Self {
            rows,
            chunk_reads: AtomicUsize::new(0),
        }
    }

    pub fn chunk_reads(&self) -> usize {
        self.chunk_reads.load(Ordering::SeqCst)
    }
}

impl ExportSource for MemoryExportSource {
    async fn fetch_export_chunk(
        &self,
        after: Option<&ExportCursor>,
        limit: u32,
    ) -> Result<Vec<ExportRow>, BoxError> {
        self.chunk_reads.fetch_add(1, Ordering::SeqCst);

        let start = match after {
            Some(cursor) => self.rows.partition_point(|row| {
                (row.name.as_str(), row.market_id) <= (cursor.name.as_str(), cursor.market_id)
            }),
            None => 0,
        };

        Ok(self
            .rows
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
