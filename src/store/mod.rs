//! Key-value cache store
//!
//! The gateway keeps both the OAuth token and cached list pages in one
//! shared store, partitioned by key namespace. Implementations must offer
//! atomic per-key operations and expire entries on their own after the TTL.

mod memory;
mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::{StoreBackend, StoreConfig};
use crate::{Error, Result};

/// Operations the gateway needs from the shared cache store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Read the value under `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key` (absent keys are not an error)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Write only when `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Counters, for stores that track them
    fn stats(&self) -> Option<StoreStatsSnapshot> {
        None
    }
}

/// Snapshot of store statistics
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StoreStatsSnapshot {
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing or an expired entry
    pub misses: u64,
    /// Expired entries removed
    pub evictions: u64,
    /// Live entries
    pub size: usize,
}

/// Store TTLs are whole seconds; sub-second TTLs round up to one second.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

/// Build the configured store backend. `clock` drives in-memory expiry.
pub async fn connect(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new(clock))),
        StoreBackend::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| Error::Config("store.url is required for the redis backend".to_string()))?;
            let store = RedisStore::connect(url).await?.with_key_prefix(config.key_prefix.clone());
            Ok(Arc::new(store))
        }
    }
}
