//! `DashMap` Cache - In-Process Store
//!
//! A `RemoteStore` backed by a concurrent `HashMap`. It is not shared between
//! processes, so it stands in for the remote service in tests, demos and
//! single-instance deployments.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::CacheResult;
use crate::key::{is_pattern, pattern_prefix};

/// Stored payload with optional expiration
#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// Concurrent in-memory store
///
/// **Features**:
/// - Lock-free concurrent reads/writes
/// - Entries live until deleted, unless a TTL was given on `set`
/// - Pattern deletes by prefix
///
/// **Example**:
/// ```rust
/// use entity_cache::backends::DashMapCache;
/// use entity_cache::RemoteStore;
///
/// # async fn example() -> entity_cache::CacheResult<()> {
/// let store = DashMapCache::new();
///
/// store.set("user:byid:1", r#"{"id":1}"#, None).await?;
/// assert_eq!(store.get("user:byid:1").await?.as_deref(), Some(r#"{"id":1}"#));
///
/// store.delete("user:*").await?;
/// assert!(store.get("user:byid:1").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DashMapCache {
    map: Arc<DashMap<String, StoredEntry>>,
}

impl DashMapCache {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing DashMap store (in-process)");

        Self {
            map: Arc::new(DashMap::new()),
        }
    }

    /// Number of live and not yet reaped entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Every key currently stored, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.map.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Default for DashMapCache {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Trait Implementations =====

use crate::traits::RemoteStore;
use async_trait::async_trait;

#[async_trait]
impl RemoteStore for DashMapCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        if let Some(entry) = self.map.get(key) {
            if entry.is_expired() {
                drop(entry); // Release read lock
                // A fresh value may have been set since the read
                self.map.remove_if(key, |_, entry| entry.is_expired());
                Ok(None)
            } else {
                Ok(Some(entry.value.clone()))
            }
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.map
            .insert(key.to_string(), StoredEntry::new(value.to_string(), ttl));
        debug!(key = %key, "[DashMap] Stored key");
        Ok(())
    }

    async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64> {
        if is_pattern(key_or_pattern) {
            let prefix = pattern_prefix(key_or_pattern);
            let mut removed = 0_u64;
            self.map.retain(|key, _| {
                if key.starts_with(prefix) {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            debug!(pattern = %key_or_pattern, count = removed, "[DashMap] Removed keys matching pattern");
            Ok(removed)
        } else {
            Ok(u64::from(self.map.remove(key_or_pattern).is_some()))
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "DashMap"
    }
}
