//! Redis-backed cache store
//!
//! Shares one multiplexed connection manager across all callers; the
//! manager reconnects on its own after transport failures.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{CacheStore, ttl_secs};
use crate::{Error, Result};

/// Redis cache store
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to the given `redis://` or `rediss://` URL
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("Invalid redis URL: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Store(format!("Failed to connect to redis: {e}")))?;

        info!("Connected to redis cache store");
        Ok(Self {
            conn,
            key_prefix: String::new(),
        })
    }

    /// Namespace every key under `prefix:`
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(self.build_key(key), value, ttl_secs(ttl))
            .await
            .map_err(|e| Error::Store(format!("SETEX failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(self.build_key(key))
            .await
            .map_err(|e| Error::Store(format!("GET failed: {e}")))?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(self.build_key(key))
            .await
            .map_err(|e| Error::Store(format!("DEL failed: {e}")))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("SET NX failed: {e}")))?;
        Ok(reply.is_some())
    }
}
