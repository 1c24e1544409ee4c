//! Error types for the CRM gateway

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for the CRM gateway
pub type Result<T> = std::result::Result<T, Error>;

/// CRM gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cached payload could not be decoded (treated as a cache miss by callers)
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// OAuth token endpoint rejected the refresh
    #[error("Token refresh failed: HTTP {status} - {body}")]
    Refresh {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// OAuth success response missing or mistyping an expected field
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// Resource backend failed on a cache miss
    #[error("Backend fetch failed: {0}")]
    BackendFetch(String),

    /// Backend answered 429
    #[error("Rate limited by backend (retry after {retry_after:?})")]
    RateLimited {
        /// Delay requested by the backend's `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// A bounded call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Cache store transport failure
    #[error("Cache store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Caller supplied unusable parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether a caller-side retry might succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// HTTP status the gateway answers with for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Refresh { .. } | Self::MalformedResponse(_) | Self::BackendFetch(_) | Self::Http(_) => 502,
            Self::Timeout { .. } => 504,
            Self::RateLimited { .. } => 429,
            Self::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}
