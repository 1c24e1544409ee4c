//! CRM Gateway Library
//!
//! Caching gateway in front of the `HubSpot` CRM API.
//!
//! # Features
//!
//! - **Token lifecycle**: OAuth refresh-token exchange with a shared, expiring token cache
//! - **List cache**: read-through caching of paginated CRM list responses
//! - **Stores**: in-memory or Redis backed key-value store with per-entry TTL
//! - **Failsafes**: retries with exponential backoff, timeouts on every outbound call
//! - **HTTP surface**: health and recent-objects endpoints with optional bearer auth

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod crm;
pub mod error;
pub mod failsafe;
pub mod gateway;
pub mod list_cache;
pub mod oauth;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
