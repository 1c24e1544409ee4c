//! CRM API client for list fetches

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{CrmObject, ResourceType};
use crate::config::CrmConfig;
use crate::failsafe::{RetryPolicy, with_retry};
use crate::oauth::AccessTokenProvider;
use crate::{Error, Result};

/// Page envelope returned by the objects endpoint
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<CrmObject>,
}

/// Reads CRM object pages with a bearer token from the provider
pub struct CrmClient {
    http_client: Client,
    base_url: String,
    tokens: Arc<AccessTokenProvider>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl CrmClient {
    /// Create a client from configuration
    #[must_use]
    pub fn new(http_client: Client, config: &CrmConfig, tokens: Arc<AccessTokenProvider>) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            retry: RetryPolicy::new(&config.retry),
            timeout: config.timeout,
        }
    }

    /// Fetch one page of `resource` (pages start at 1)
    ///
    /// Rate-limited and timed-out calls are retried with exponential backoff;
    /// every other failure is returned immediately.
    pub async fn fetch_page(
        &self,
        resource: ResourceType,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CrmObject>> {
        with_retry(&self.retry, resource.as_str(), || {
            self.fetch_once(resource, page, page_size)
        })
        .await
    }

    async fn fetch_once(
        &self,
        resource: ResourceType,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CrmObject>> {
        let token = self.tokens.get_token().await?;
        let url = self.page_url(resource, page, page_size)?;
        debug!(%resource, page, page_size, "Fetching page from CRM");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(resource, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!(%resource, ?retry_after, "CRM rate limit hit");
            return Err(Error::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED {
            // Token was revoked early; make the next call refresh
            if let Err(e) = self.tokens.cache().invalidate().await {
                warn!(error = %e, "Failed to drop rejected token");
            }
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendFetch(format!(
                "{resource}: HTTP {status} - {body}"
            )));
        }

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendFetch(format!("{resource}: invalid list response: {e}")))?;
        Ok(list.results)
    }

    fn page_url(&self, resource: ResourceType, page: u32, page_size: u32) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/crm/v3/objects/{}", self.base_url, resource))
            .map_err(|e| Error::Config(format!("Invalid CRM base URL: {e}")))?;
        let offset = u64::from(page.saturating_sub(1)) * u64::from(page_size);
        url.query_pairs_mut()
            .append_pair("limit", &page_size.to_string())
            .append_pair("after", &offset.to_string());
        Ok(url)
    }

    fn transport_error(&self, resource: ResourceType, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(format!("{resource} fetch"), self.timeout)
        } else if e.is_connect() {
            Error::Http(e)
        } else {
            Error::BackendFetch(format!("{resource}: {e}"))
        }
    }
}
