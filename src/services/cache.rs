use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::core::{BoxError, RatingLookup};

/// In-memory rating cache in front of a [`RatingLookup`]
///
/// Cached names are answered locally; the rest go to the inner lookup in a
/// single batched call. Names the inner lookup does not know about are not
/// cached.
pub struct CachedRatings<L> {
    inner: L,
    cache: moka::future::Cache<String, f64>,
}

impl<L: RatingLookup> CachedRatings<L> {
    pub fn new(inner: L, max_entries: u64, ttl_secs: u64) -> Self {
        let cache = moka::future::CacheBuilder::new(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, cache }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Drop every cached rating, e.g. after reviews change
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Number of ratings currently cached
    pub async fn cached_entries(&self) -> u64 {
        // Pending inserts and evictions are only counted once applied
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    async fn lookup(&self, names: &BTreeSet<String>) -> Result<HashMap<String, f64>, BoxError> {
        let mut ratings = HashMap::with_capacity(names.len());
        let mut missing = BTreeSet::new();

        for name in names {
            match self.cache.get(name).await {
                Some(rating) => {
                    ratings.insert(name.clone(), rating);
                }
                None => {
                    missing.insert(name.clone());
                }
            }
        }

        tracing::trace!("Rating cache: {} hits, {} misses", ratings.len(), missing.len());

        if missing.is_empty() {
            return Ok(ratings);
        }

        let fetched = self.inner.average_ratings_for(&missing).await?;
        for (name, rating) in fetched {
            self.cache.insert(name.clone(), rating).await;
            ratings.insert(name, rating);
        }

        Ok(ratings)
    }
}

impl<L: RatingLookup> RatingLookup for CachedRatings<L> {
    async fn average_ratings_for(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, BoxError> {
        self.lookup(names).await
    }
}
