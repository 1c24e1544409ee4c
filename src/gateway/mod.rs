//! Gateway wiring and HTTP surface

pub mod auth;
mod router;
mod server;

pub use router::{ApiError, AppState, NewObjectsQuery, create_router};
pub use server::Gateway;

use std::sync::Arc;

use reqwest::Client;

use crate::Result;
use crate::clock::Clock;
use crate::config::{AuthConfig, Config};
use crate::crm::{CrmClient, RecentObjects};
use crate::list_cache::ListCache;
use crate::oauth::{self, AccessTokenProvider};
use crate::store::{self, CacheStore};
use auth::ResolvedAuthConfig;

/// Explicitly constructed components shared by handlers and CLI commands
pub struct Services {
    /// Shared cache store
    pub store: Arc<dyn CacheStore>,
    /// Access token provider
    pub tokens: Arc<AccessTokenProvider>,
    /// Recent objects service
    pub recent: Arc<RecentObjects>,
}

impl Services {
    /// Connect the configured store and build every component on top of it
    pub async fn build(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = store::connect(&config.store, Arc::clone(&clock)).await?;
        Self::with_store(config, store, clock)
    }

    /// Build every component on top of an existing store
    pub fn with_store(config: &Config, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("crm-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let tokens = Arc::new(oauth::build_provider(
            &config.oauth,
            Arc::clone(&store),
            config.store.timeout,
            clock,
            http_client.clone(),
        ));
        let crm = Arc::new(CrmClient::new(http_client, &config.crm, Arc::clone(&tokens)));
        let lists = Arc::new(ListCache::new(
            Arc::clone(&store),
            &config.list_cache,
            config.store.timeout,
        ));
        let recent = Arc::new(RecentObjects::new(crm, lists));

        Ok(Self {
            store,
            tokens,
            recent,
        })
    }

    /// Handler state with the given authentication settings
    #[must_use]
    pub fn app_state(&self, auth: &AuthConfig) -> Arc<AppState> {
        Arc::new(AppState {
            tokens: Arc::clone(&self.tokens),
            recent: Arc::clone(&self.recent),
            store: Arc::clone(&self.store),
            auth_config: Arc::new(ResolvedAuthConfig::from_config(auth)),
        })
    }
}
