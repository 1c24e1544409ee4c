//! Read-through cache for paginated list queries
//!
//! Pages are cached whole under `{resource}_page_{page}_size_{page_size}`.
//! A different page or page size is a different entry; pages are never
//! merged or re-sliced. Entries are replaced wholesale and expire after the
//! configured TTL (one hour by default). Sorting and filtering belong to the
//! caller and happen after retrieval, so the cached payload is always the raw
//! backend page.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ListCacheConfig;
use crate::failsafe::with_timeout;
use crate::store::CacheStore;
use crate::{Error, Result};

/// Read-through page cache over the shared store
pub struct ListCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    store_timeout: Duration,
    fetch_timeout: Duration,
    stats: ListCacheStats,
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct ListCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Snapshot of list cache statistics
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListCacheStatsSnapshot {
    /// Pages served from cache
    pub hits: u64,
    /// Pages fetched from the backend
    pub misses: u64,
    /// Backend fetches that failed
    pub fetch_failures: u64,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

/// Cache key for one page of one resource
#[must_use]
pub fn page_key(resource: &str, page: u32, page_size: u32) -> String {
    format!("{resource}_page_{page}_size_{page_size}")
}

impl ListCache {
    /// Create a list cache
    pub fn new(store: Arc<dyn CacheStore>, config: &ListCacheConfig, store_timeout: Duration) -> Self {
        Self {
            store,
            ttl: config.ttl,
            store_timeout,
            fetch_timeout: config.fetch_timeout,
            stats: ListCacheStats::default(),
        }
    }

    /// Lifetime of a cached page
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serve a page from cache, or fetch, cache and return it
    ///
    /// `fetch` is called with `(page, page_size)` only on a miss and must be
    /// read-only. Its failure is returned as is and nothing is cached.
    pub async fn get_page<T, F, Fut>(
        &self,
        resource: &str,
        page: u32,
        page_size: u32,
        fetch: F,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(u32, u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let key = page_key(resource, page, page_size);

        if let Some(cached) = self.lookup::<T>(&key).await {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, records = cached.len(), "List cache hit");
            return Ok(cached);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let records = match with_timeout("backend fetch", self.fetch_timeout, fetch(page, page_size)).await {
            Ok(records) => records,
            Err(e) => {
                self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Backend fetch failed, nothing cached");
                return Err(e);
            }
        };

        match serde_json::to_string(&records) {
            Ok(encoded) => {
                let write = with_timeout(
                    "list cache write",
                    self.store_timeout,
                    self.store.set(&key, &encoded, self.ttl),
                )
                .await;
                match write {
                    Ok(()) => info!(key = %key, records = records.len(), ttl_secs = self.ttl.as_secs(), "Cached list page"),
                    Err(e) => warn!(key = %key, error = %e, "Failed to cache list page"),
                }
            }
            Err(e) => warn!(key = %key, error = %e, "List page not serializable, not cached"),
        }

        Ok(records)
    }

    /// Drop one cached page
    pub async fn invalidate(&self, resource: &str, page: u32, page_size: u32) -> Result<()> {
        let key = page_key(resource, page, page_size);
        with_timeout("list cache delete", self.store_timeout, self.store.delete(&key)).await
    }

    /// Get cache statistics
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> ListCacheStatsSnapshot {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        ListCacheStatsSnapshot {
            hits,
            misses,
            fetch_failures: self.stats.fetch_failures.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    /// Read and decode a cached page; any failure counts as a miss
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let raw = match with_timeout("list cache read", self.store_timeout, self.store.get(key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "List cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => Some(records),
            Err(e) => {
                let e = Error::Deserialization(format!("{key}: {e}"));
                warn!(error = %e, "Corrupt list cache entry, treating as miss");
                None
            }
        }
    }
}
