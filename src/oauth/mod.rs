//! OAuth access-token lifecycle
//!
//! - [`TokenCache`]: the current token under a reserved cache-store key
//! - [`TokenRefresher`]: `refresh_token` grant against the token endpoint
//! - [`AccessTokenProvider`]: valid token on demand, refresh on miss or expiry

mod cache;
mod provider;
mod record;
mod refresher;

pub use cache::TokenCache;
pub use provider::AccessTokenProvider;
pub use record::TokenRecord;
pub use refresher::{RefreshCredentials, TokenRefresher};

use std::sync::Arc;

use reqwest::Client;

use crate::clock::Clock;
use crate::config::OAuthConfig;
use crate::store::CacheStore;

/// Wire the token cache, refresher and provider from configuration
pub fn build_provider(
    config: &OAuthConfig,
    store: Arc<dyn CacheStore>,
    store_timeout: std::time::Duration,
    clock: Arc<dyn Clock>,
    http_client: Client,
) -> AccessTokenProvider {
    let cache = Arc::new(TokenCache::new(
        store,
        config.token_key.clone(),
        clock,
        store_timeout,
    ));
    let refresher = TokenRefresher::new(
        http_client,
        config.token_url.clone(),
        RefreshCredentials::from_config(config),
        Arc::clone(&cache),
        config.timeout,
    );
    AccessTokenProvider::new(cache, refresher, config.single_flight)
}
