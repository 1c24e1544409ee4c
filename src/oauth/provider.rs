//! Access token provider
//!
//! Single entry point for callers that need a bearer token. A valid cached
//! token is returned without network I/O; anything else (nothing cached,
//! expired, unreadable) triggers one refresh.
//!
//! Concurrent callers that all see a missing token may each refresh; that is
//! tolerated. With single-flight enabled, refreshes inside one process are
//! serialized and waiters re-read the cache before refreshing themselves.
//! Across processes sharing a store, a sentinel key claimed with
//! `set_if_absent` lets one instance refresh while the others poll the cache
//! for up to one refresh timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::cache::TokenCache;
use super::record::TokenRecord;
use super::refresher::TokenRefresher;
use crate::Result;

const PEER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Hands out currently-valid access tokens
pub struct AccessTokenProvider {
    cache: Arc<TokenCache>,
    refresher: TokenRefresher,
    refresh_lock: Option<Mutex<()>>,
}

impl AccessTokenProvider {
    /// Create a provider. `single_flight` serializes refreshes in-process.
    pub fn new(cache: Arc<TokenCache>, refresher: TokenRefresher, single_flight: bool) -> Self {
        Self {
            cache,
            refresher,
            refresh_lock: single_flight.then(|| Mutex::new(())),
        }
    }

    /// The underlying refresher
    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    /// The underlying token cache
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a valid access token, refreshing when needed
    ///
    /// Only refresh failures ([`crate::Error::Refresh`],
    /// [`crate::Error::MalformedResponse`], timeouts and transport errors)
    /// reach the caller; cache read problems count as a miss.
    pub async fn get_token(&self) -> Result<String> {
        if let Some(record) = self.cached().await {
            return Ok(record.token);
        }

        let Some(lock) = &self.refresh_lock else {
            return Ok(self.refresher.refresh().await?.token);
        };

        let _guard = lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(record) = self.cached().await {
            debug!("Token refreshed by concurrent caller");
            return Ok(record.token);
        }
        self.refresh_exclusive().await
    }

    /// Refresh unconditionally, ignoring any cached token
    pub async fn force_refresh(&self) -> Result<String> {
        let _guard = match &self.refresh_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        Ok(self.refresher.refresh().await?.token)
    }

    /// Refresh under the shared sentinel, or wait for the instance holding it
    async fn refresh_exclusive(&self) -> Result<String> {
        match self.cache.claim_refresh(self.refresher.timeout()).await {
            Ok(true) => {
                let refreshed = self.refresher.refresh().await;
                if let Err(e) = self.cache.release_refresh().await {
                    warn!(error = %e, "Failed to release refresh sentinel");
                }
                Ok(refreshed?.token)
            }
            Ok(false) => {
                if let Some(record) = self.await_peer_refresh().await {
                    debug!("Token refreshed by another instance");
                    return Ok(record.token);
                }
                debug!("No token from peer refresh, refreshing");
                Ok(self.refresher.refresh().await?.token)
            }
            Err(e) => {
                warn!(error = %e, "Refresh sentinel unavailable, refreshing");
                Ok(self.refresher.refresh().await?.token)
            }
        }
    }

    async fn await_peer_refresh(&self) -> Option<TokenRecord> {
        let deadline = Instant::now() + self.refresher.timeout();
        while Instant::now() < deadline {
            sleep(PEER_POLL_INTERVAL).await;
            if let Some(record) = self.cached().await {
                return Some(record);
            }
        }
        None
    }

    async fn cached(&self) -> Option<TokenRecord> {
        match self.cache.load().await {
            Ok(Some(record)) if record.is_valid_at(self.cache.now()) => {
                debug!(expires_at = record.expires_at, "Using cached access token");
                Some(record)
            }
            Ok(_) => {
                debug!("No valid cached token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token cache unreadable, treating as missing");
                None
            }
        }
    }
}
