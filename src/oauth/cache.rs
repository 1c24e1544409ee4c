//! Token cache
//!
//! Persists the current access token under one reserved key of the shared
//! cache store. The store entry's TTL equals the token lifetime, so the
//! record disappears on its own no later than the token expires. No locking
//! happens here; concurrent refresh policy lives in the provider.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::record::TokenRecord;
use crate::{Error, Result};
use crate::clock::Clock;
use crate::failsafe::with_timeout;
use crate::store::CacheStore;

/// Token persistence over the shared cache store
pub struct TokenCache {
    store: Arc<dyn CacheStore>,
    key: String,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl TokenCache {
    /// Create a token cache writing under `key`
    pub fn new(
        store: Arc<dyn CacheStore>,
        key: impl Into<String>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            clock,
            timeout,
        }
    }

    /// Reserved key holding the token record
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current time according to the cache's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Build the record for a token issued now
    #[must_use]
    pub fn issue(&self, token: impl Into<String>, expires_in: u64) -> TokenRecord {
        TokenRecord::issued(token, expires_in, self.clock.now())
    }

    /// Store a freshly issued token, returning the written record
    pub async fn store(&self, token: &str, expires_in: u64) -> Result<TokenRecord> {
        let record = self.issue(token, expires_in);
        self.save(&record).await?;
        Ok(record)
    }

    /// Write `record` under the reserved key, expiring with the token
    ///
    /// A record that is not valid now is rejected with [`Error::Internal`].
    pub async fn save(&self, record: &TokenRecord) -> Result<()> {
        let now = self.clock.now();
        if !record.is_valid_at(now) {
            return Err(Error::Internal(format!(
                "refusing to cache a token expiring at {} (now {now})",
                record.expires_at
            )));
        }
        let lifetime = Duration::from_secs(record.expires_at.saturating_sub(now));
        let encoded = record.encode()?;
        with_timeout(
            "token cache write",
            self.timeout,
            self.store.set(&self.key, &encoded, lifetime),
        )
        .await?;
        debug!(key = %self.key, expires_at = record.expires_at, "Stored access token");
        Ok(())
    }

    /// Read the current record
    ///
    /// Returns `Ok(None)` when nothing is cached or the cached token has
    /// already expired (the stale entry is removed best-effort). A payload
    /// that does not decode fails with [`crate::Error::Deserialization`].
    pub async fn load(&self) -> Result<Option<TokenRecord>> {
        let raw = with_timeout("token cache read", self.timeout, self.store.get(&self.key)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let record = TokenRecord::decode(&raw)?;
        if record.is_valid_at(self.clock.now()) {
            Ok(Some(record))
        } else {
            debug!(key = %self.key, "Cached token expired");
            if let Err(e) = self.invalidate().await {
                warn!(key = %self.key, error = %e, "Failed to drop expired token");
            }
            Ok(None)
        }
    }

    /// Remove the cached token
    pub async fn invalidate(&self) -> Result<()> {
        with_timeout("token cache delete", self.timeout, self.store.delete(&self.key)).await
    }

    /// Key of the sentinel marking a refresh in progress
    pub fn sentinel_key(&self) -> String {
        format!("{}:refreshing", self.key)
    }

    /// Claim the refresh sentinel for `hold`. `false` means another
    /// process holds it.
    pub async fn claim_refresh(&self, hold: Duration) -> Result<bool> {
        let key = self.sentinel_key();
        with_timeout(
            "token refresh claim",
            self.timeout,
            self.store.set_if_absent(&key, "1", hold),
        )
        .await
    }

    /// Release the refresh sentinel
    pub async fn release_refresh(&self) -> Result<()> {
        let key = self.sentinel_key();
        with_timeout("token refresh release", self.timeout, self.store.delete(&key)).await
    }
}
