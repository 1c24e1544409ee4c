//! Configuration management

use std::{env, fmt, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fixed horizon for cached list pages
pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(3600);

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication for internal callers
    pub auth: AuthConfig,
    /// Cache store connection
    pub store: StoreConfig,
    /// OAuth refresh configuration
    pub oauth: OAuthConfig,
    /// CRM backend configuration
    pub crm: CrmConfig,
    /// Read-through list cache configuration
    pub list_cache: ListCacheConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (CRM_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("CRM_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        config.expand_env_vars()?;

        Ok(config)
    }

    /// Check that the loaded configuration can run a gateway
    pub fn validate(&self) -> Result<()> {
        if self.oauth.token_url.is_empty() {
            return Err(Error::Config("oauth.token_url is required".to_string()));
        }
        for (name, value) in [
            ("oauth.client_id", &self.oauth.client_id),
            ("oauth.client_secret", &self.oauth.client_secret),
            ("oauth.refresh_token", &self.oauth.refresh_token),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("{name} is required")));
            }
        }
        if self.oauth.token_key.is_empty() {
            return Err(Error::Config("oauth.token_key must not be empty".to_string()));
        }
        if self.list_cache.ttl.is_zero() {
            return Err(Error::Config("list_cache.ttl must be positive".to_string()));
        }
        if self.store.backend == StoreBackend::Redis && self.store.url.is_none() {
            return Err(Error::Config(
                "store.url is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand `${VAR}`, `${VAR:-default}` and `env:VAR` in URLs and credentials
    fn expand_env_vars(&mut self) -> Result<()> {
        // Pattern: ${VAR} or ${VAR:-default}
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for value in [
            &mut self.oauth.token_url,
            &mut self.oauth.client_id,
            &mut self.oauth.client_secret,
            &mut self.oauth.refresh_token,
            &mut self.crm.base_url,
        ] {
            *value = resolve_secret(&Self::expand_string(&re, value));
        }
        if let Some(url) = self.store.url.as_mut() {
            *url = resolve_secret(&Self::expand_string(&re, url));
        }
        for token in &mut self.auth.bearer_tokens {
            *token = resolve_secret(&Self::expand_string(&re, token));
        }
        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Resolve `env:VAR_NAME` indirection, leaving literals untouched
fn resolve_secret(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_default()
    } else {
        value.to_string()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Authentication configuration for internal callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable authentication
    pub enabled: bool,
    /// Accepted bearer tokens (literal or `env:VAR_NAME`)
    pub bearer_tokens: Vec<String>,
    /// Paths that bypass authentication
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bearer_tokens: Vec::new(),
            public_paths: vec!["/health".to_string()],
        }
    }
}

/// Which cache store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store (single node, tests)
    #[default]
    Memory,
    /// Shared redis server
    Redis,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store implementation
    pub backend: StoreBackend,
    /// Connection URL (`redis://` or `rediss://` for TLS)
    pub url: Option<String>,
    /// Prefix applied to every key (redis only)
    pub key_prefix: String,
    /// Deadline for each store call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            key_prefix: String::new(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// OAuth refresh configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Token endpoint
    pub token_url: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret (literal or `env:VAR_NAME`)
    pub client_secret: String,
    /// Long-lived refresh token (literal or `env:VAR_NAME`)
    pub refresh_token: String,
    /// Reserved cache key holding the current access token
    pub token_key: String,
    /// Deadline for the token endpoint call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Serialize concurrent refreshes within this process
    pub single_flight: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: "https://api.hubapi.com/oauth/v1/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            token_key: "hubspot_token".to_string(),
            timeout: Duration::from_secs(10),
            single_flight: true,
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_key", &self.token_key)
            .field("timeout", &self.timeout)
            .field("single_flight", &self.single_flight)
            .finish()
    }
}

/// CRM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// API base URL
    pub base_url: String,
    /// Deadline for each backend call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Backoff for rate-limited calls
    pub retry: RetryConfig,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.hubapi.com".to_string(),
            timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts
    pub max_attempts: u32,
    /// Initial backoff
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Read-through list cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListCacheConfig {
    /// Lifetime of a cached page
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Deadline for each backend fetch on a miss
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for ListCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LIST_TTL,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() > 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
