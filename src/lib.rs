//! Entity Cache
//!
//! A read-through cache layer for repositories, sitting between repository
//! methods and the persistent store:
//! - **Read-through**: point lookups and list queries are served from a
//!   shared remote key-value store, loading from the source of truth on a miss
//! - **Stale-while-revalidate**: hits return immediately and are refreshed by a
//!   bounded pool of background tasks
//! - **Single-flight**: concurrent misses for one key share one loader call
//! - **Write-driven invalidation**: writes rewrite detail entries and drop
//!   list entries; deletes drop the whole entity namespace
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use entity_cache::CacheSystem;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystem::new().await?;
//!     let users = cache.entity("user");
//!
//!     let user: User = users
//!         .get_cached_detail("byid", &[&5], || async {
//!             anyhow::Ok(User { id: 5, name: "Ada".into() })
//!         })
//!         .await?;
//!
//!     users.invalidate_cache(&["list"]).await;
//!
//!     let stats = cache.cache_manager().get_stats();
//!     tracing::info!("Hit rate: {:.2}%", stats.hit_rate);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Repository → EntityCache → CacheManager → RemoteStore (HTTP / Redis / DashMap)
//!                  │              ├─ SingleFlight (miss coalescing)
//!                  │              └─ RefreshPool (background refresh)
//!                  └─ InvalidationManager (writes, deletes)
//! ```
//!
//! Coalescing is per process; several service instances sharing one store
//! each run their own single-flight registry.

use std::sync::Arc;
use anyhow::Result;
use tracing::{info, warn};

pub mod backends;
pub mod builder;
pub mod cache_manager;
pub mod codecs;
pub mod config;
pub mod entity_cache;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod refresh;
pub mod single_flight;
pub mod traits;

pub use backends::DashMapCache;
#[cfg(feature = "http")]
pub use backends::HttpCache;
#[cfg(feature = "redis")]
pub use backends::RedisCache;
pub use builder::CacheSystemBuilder;
pub use cache_manager::{CacheManager, CacheManagerStats};
pub use codecs::JsonCodec;
pub use config::{CacheConfig, ReadFailurePolicy, RefreshConfig};
pub use entity_cache::EntityCache;
pub use error::{CacheError, CacheResult};
pub use invalidation::{InvalidationManager, InvalidationReport};
pub use key::{CacheKey, KeyParam};
pub use refresh::{RefreshPool, RefreshStats};
pub use single_flight::SingleFlight;
pub use traits::{CachedEntity, DetailKey, RemoteStore};

// Re-export async_trait for store implementors
pub use async_trait::async_trait;

/// Main entry point for the entity cache
///
/// Owns the shared [`CacheManager`] and hands out namespace-scoped
/// [`EntityCache`] handles to repositories.
///
/// # Example
///
/// ```rust,no_run
/// use entity_cache::CacheSystem;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let cache = CacheSystem::new().await?;
///     let users = cache.entity("user");
///     let posts = cache.entity("post");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheSystem {
    /// Shared cache manager
    pub cache_manager: Arc<CacheManager>,
}

impl CacheSystem {
    /// Create a cache system configured from the environment
    ///
    /// See [`CacheConfig::from_env`] for the variables read.
    ///
    /// # Errors
    ///
    /// Invalid configuration or an unreachable backend.
    pub async fn new() -> Result<Self> {
        info!("Initializing entity cache from environment");
        CacheSystemBuilder::new()
            .with_config(CacheConfig::from_env()?)
            .build()
            .await
    }

    /// Create a cache system over an existing store with default options
    pub fn with_store(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            cache_manager: Arc::new(CacheManager::new(store)),
        }
    }

    /// Namespace-scoped cache handle for a repository
    #[must_use]
    pub fn entity(&self, namespace: &str) -> EntityCache {
        EntityCache::new(namespace, Arc::clone(&self.cache_manager))
    }

    /// Cache handle for the namespace of `E`
    #[must_use]
    pub fn entity_for<E: CachedEntity>(&self) -> EntityCache {
        EntityCache::for_entity::<E>(Arc::clone(&self.cache_manager))
    }

    /// Check that the remote store is reachable
    ///
    /// The cache layer keeps serving from the source of truth when the store
    /// is down (with the default fail-open read policy), so a failed check
    /// is a degradation, not an outage.
    pub async fn health_check(&self) -> bool {
        let healthy = self.cache_manager.health_check().await;
        if healthy {
            info!(store = self.cache_manager.store().name(), "Entity cache health check passed");
        } else {
            warn!(store = self.cache_manager.store().name(), "Entity cache health check failed");
        }
        healthy
    }

    /// Get reference to cache manager
    #[must_use]
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.cache_manager
    }
}
