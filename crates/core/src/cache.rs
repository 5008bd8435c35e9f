//! Response cache with a fixed expiry.
//!
//! Raw vendor payloads are stored as JSON text under caller-chosen keys.
//! [`RedisCache`] is used when a Redis URL is configured; [`MemoryCache`]
//! keeps the same semantics in-process.

use crate::error::{ToolError, ToolResult};
use async_trait::async_trait;
use moka::future::Cache;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Key/value cache whose entries expire after a fixed time-to-live.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> ToolResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> ToolResult<()>;

    /// Expiry applied to every entry.
    fn ttl(&self) -> Duration;
}

/// Redis-backed cache (`SET key value EX ttl`).
pub struct RedisCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, ttl: Duration) -> ToolResult<Self> {
        info!(url = %url, "Connecting to Redis");

        let client = Client::open(url).map_err(|e| ToolError::upstream("redis", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ToolError::upstream("redis", e))?;

        info!("Connected to Redis");

        Ok(Self { conn, ttl })
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> ToolResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| ToolError::upstream("redis", e))
    }

    async fn set(&self, key: &str, value: &str) -> ToolResult<()> {
        let mut conn = self.conn.clone();
        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "Setting cache key");

        conn.set_ex::<_, _, ()>(key, value, self.ttl.as_secs())
            .await
            .map_err(|e| ToolError::upstream("redis", e))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// In-process cache used when no Redis server is configured.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, String>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
            ttl,
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> ToolResult<Option<String>> {
        Ok(self.inner.get(key).await)
    }

    async fn set(&self, key: &str, value: &str) -> ToolResult<()> {
        self.inner.insert(key.to_string(), value.to_string()).await;
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
