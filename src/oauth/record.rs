//! Cached access token representation

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Access token together with its absolute expiry
///
/// Decoding is strict: unknown fields, missing fields and wrong types all
/// fail, so a tampered cache entry is never half-trusted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRecord {
    /// Bearer token
    pub token: String,
    /// Unix second at which the token stops being usable
    pub expires_at: u64,
}

impl TokenRecord {
    /// Record for a token issued at `now` with a lifetime of `expires_in` seconds
    #[must_use]
    pub fn issued(token: impl Into<String>, expires_in: u64, now: u64) -> Self {
        Self {
            token: token.into(),
            expires_at: now.saturating_add(expires_in),
        }
    }

    /// Whether the token may still be used at `now`
    #[must_use]
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry, `None` once expired
    #[must_use]
    pub fn remaining(&self, now: u64) -> Option<Duration> {
        self.is_valid_at(now)
            .then(|| Duration::from_secs(self.expires_at - now))
    }

    pub(crate) fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Deserialization(format!("token record: {e}")))
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
