//! Token refresher
//!
//! Exchanges the long-lived refresh token for a new access token at the
//! OAuth token endpoint and writes the result to the token cache.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::cache::TokenCache;
use super::record::TokenRecord;
use crate::config::OAuthConfig;
use crate::failsafe::with_timeout;
use crate::{Error, Result};

/// Credentials presented on every refresh; read-only after startup
#[derive(Clone)]
pub struct RefreshCredentials {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
}

impl RefreshCredentials {
    /// Take the credentials from the OAuth config section
    #[must_use]
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
        }
    }
}

impl fmt::Debug for RefreshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Fields the gateway needs from a successful token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Refreshes the access token against the OAuth endpoint
pub struct TokenRefresher {
    http_client: Client,
    token_url: String,
    credentials: RefreshCredentials,
    cache: Arc<TokenCache>,
    timeout: Duration,
    refreshes: AtomicU64,
}

impl TokenRefresher {
    /// Create a refresher posting to `token_url`
    pub fn new(
        http_client: Client,
        token_url: impl Into<String>,
        credentials: RefreshCredentials,
        cache: Arc<TokenCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            credentials,
            cache,
            timeout,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Deadline for one refresh round trip
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of successful refreshes performed by this refresher
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Obtain a new access token and cache it
    ///
    /// One POST, no retry. A rejected refresh fails with
    /// [`Error::Refresh`] carrying the endpoint's status and body.
    pub async fn refresh(&self) -> Result<TokenRecord> {
        let (access_token, expires_in) =
            with_timeout("oauth token refresh", self.timeout, self.request_token()).await?;

        let record = self.cache.issue(access_token, expires_in);
        // The token is usable even if it could not be cached
        if let Err(e) = self.cache.save(&record).await {
            warn!(error = %e, "Refreshed token could not be cached");
        }

        self.refreshes.fetch_add(1, Ordering::Relaxed);
        info!(expires_in, "Access token refreshed");
        Ok(record)
    }

    async fn request_token(&self) -> Result<(String, u64)> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            error!(status = status.as_u16(), "Token refresh rejected");
            return Err(Error::Refresh {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("token response: {e}")))?;

        if parsed.expires_in == 0 {
            return Err(Error::MalformedResponse(
                "token response: expires_in must be positive".to_string(),
            ));
        }
        if parsed.access_token.is_empty() {
            return Err(Error::MalformedResponse(
                "token response: access_token is empty".to_string(),
            ));
        }

        Ok((parsed.access_token, parsed.expires_in))
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout("oauth token refresh", self.timeout)
        } else {
            Error::Http(e)
        }
    }
}
