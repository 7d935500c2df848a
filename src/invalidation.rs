//! Write-driven cache maintenance
//!
//! After the source of truth commits a write, cache entries are brought back
//! in line:
//!
//! - **create/update**: every detail key the entity is cached under is
//!   rewritten with the new state, then the list and aggregate keys of the
//!   namespace are deleted (list membership cannot be derived locally).
//! - **delete**: the whole namespace is deleted.
//!
//! Cache-side failures never fail the triggering write. Each store call is
//! independent; failures are logged and counted in an [`InvalidationReport`].

use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache_manager::CacheManager;
use crate::key::CacheKey;
use crate::traits::CachedEntity;

/// Outcome of a batch of cache writes or deletes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Store calls issued
    pub attempted: usize,
    /// Store calls that failed
    pub failed: usize,
}

impl InvalidationReport {
    /// `true` when every store call succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn merge(self, other: Self) -> Self {
        Self {
            attempted: self.attempted + other.attempted,
            failed: self.failed + other.failed,
        }
    }
}

/// Write/Invalidation Manager
#[derive(Clone)]
pub struct InvalidationManager {
    manager: Arc<CacheManager>,
}

impl InvalidationManager {
    /// Create an invalidation manager over a cache manager
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self { manager }
    }

    /// Write a known value under `key`
    pub async fn cache_detail<T>(&self, key: &CacheKey, value: &T) -> InvalidationReport
    where
        T: serde::Serialize + Sync + ?Sized,
    {
        let payload = match self.manager.encode(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to encode value for detail cache");
                return InvalidationReport { attempted: 0, failed: 1 };
            }
        };
        self.write_all(&[key.clone()], &payload).await
    }

    /// Delete the cached results of `operations` inside `namespace`
    ///
    /// For each operation both `namespace:operation` and
    /// `namespace:operation:*` are deleted.
    pub async fn invalidate_operations<S>(&self, namespace: &str, operations: &[S]) -> InvalidationReport
    where
        S: AsRef<str> + Sync,
    {
        let targets: Vec<String> = operations
            .iter()
            .flat_map(|op| CacheKey::operation_keys(namespace, op.as_ref()))
            .collect();
        self.delete_all(&targets).await
    }

    /// Delete every entry of `namespace`
    pub async fn invalidate_namespace(&self, namespace: &str) -> InvalidationReport {
        self.delete_all(&[CacheKey::namespace_pattern(namespace)]).await
    }

    /// Refresh detail entries and drop list entries after a create or update
    pub async fn on_write<E: CachedEntity>(&self, entity: &E) -> InvalidationReport {
        let keys: Vec<CacheKey> = entity
            .detail_keys()
            .iter()
            .map(|detail| detail.to_cache_key(E::NAMESPACE))
            .collect();

        let written = match self.manager.encode(entity) {
            Ok(payload) => self.write_all(&keys, &payload).await,
            Err(err) => {
                warn!(namespace = E::NAMESPACE, error = %err, "Failed to encode entity for detail cache");
                InvalidationReport { attempted: 0, failed: keys.len() }
            }
        };

        let invalidated = self.invalidate_operations(E::NAMESPACE, E::list_operations()).await;
        debug!(
            namespace = E::NAMESPACE,
            detail_keys = keys.len(),
            list_operations = E::list_operations().len(),
            "Cache updated after entity write"
        );
        written.merge(invalidated)
    }

    /// Drop every cache entry of `E`'s namespace after a delete
    pub async fn on_delete<E: CachedEntity>(&self) -> InvalidationReport {
        self.invalidate_namespace(E::NAMESPACE).await
    }

    async fn write_all(&self, keys: &[CacheKey], payload: &str) -> InvalidationReport {
        let results = join_all(keys.iter().map(|key| self.manager.set_payload(key.as_str(), payload))).await;

        let mut failed = 0;
        for (key, result) in keys.iter().zip(results) {
            if let Err(err) = result {
                failed += 1;
                warn!(key = %key, error = %err, "Failed to write detail cache entry");
            }
        }
        InvalidationReport {
            attempted: keys.len(),
            failed,
        }
    }

    async fn delete_all(&self, targets: &[String]) -> InvalidationReport {
        let results = join_all(targets.iter().map(|target| self.manager.delete(target))).await;

        let mut failed = 0;
        for (target, result) in targets.iter().zip(results) {
            if let Err(err) = result {
                failed += 1;
                warn!(key = %target, error = %err, "Failed to invalidate cache entries");
            }
        }
        InvalidationReport {
            attempted: targets.len(),
            failed,
        }
    }
}

