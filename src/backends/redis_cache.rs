//! Redis Cache - Native Redis Store
//!
//! Talks RESP to a Redis server through `ConnectionManager`, which reconnects
//! automatically.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CacheResult;
use crate::key::is_pattern;

/// Keys fetched per `SCAN` round trip
const SCAN_BATCH: usize = 100;

/// Redis store with `ConnectionManager` for automatic reconnection
///
/// Pattern deletes run `SCAN MATCH` to completion and then `DEL` the matched
/// keys. This is not atomic: a key written between the scan and the delete
/// survives the invalidation.
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect using `REDIS_URL` (default `redis://127.0.0.1:6379`)
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn new() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| crate::config::DEFAULT_REDIS_URL.to_string());
        Self::with_url(&redis_url).await
    }

    /// Connect to a specific Redis URL
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn with_url(redis_url: &str) -> Result<Self> {
        info!(redis_url = %redis_url, "Initializing Redis store with ConnectionManager");

        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client with URL: {redis_url}"))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redis_url, "Redis store connected");

        Ok(Self { conn_manager })
    }

    /// Scan keys matching a glob pattern with cursor-based `SCAN`
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            cursor = next;
            keys.extend(batch);

            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    /// Remove multiple keys in one `DEL`
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn remove_bulk(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn_manager.clone();
        let count: u64 = conn.del(keys).await?;
        debug!(count = count, "[Redis] Removed keys in bulk");
        Ok(count)
    }
}

// ===== Trait Implementations =====

use crate::traits::RemoteStore;
use async_trait::async_trait;

#[async_trait]
impl RemoteStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();

        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        debug!(key = %key, "[Redis] Stored key");
        Ok(())
    }

    async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64> {
        if is_pattern(key_or_pattern) {
            let keys = self.scan_keys(key_or_pattern).await?;
            let mut removed = 0;
            for chunk in keys.chunks(SCAN_BATCH) {
                removed += self.remove_bulk(chunk).await?;
            }
            Ok(removed)
        } else {
            let mut conn = self.conn_manager.clone();
            let count: u64 = conn.del(key_or_pattern).await?;
            Ok(count)
        }
    }

    async fn health_check(&self) -> bool {
        let test_key = format!("health_check:{}", Uuid::new_v4());

        match self.set(&test_key, "ok", Some(Duration::from_secs(10))).await {
            Ok(()) => match self.get(&test_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.delete(&test_key).await;
                    retrieved == "ok"
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
