//! Cache System Builder
//!
//! Builder for [`CacheSystem`] with a configured or custom store.
//!
//! # Example: Configuration from the environment
//!
//! ```rust,no_run
//! use entity_cache::CacheSystemBuilder;
//! use entity_cache::config::CacheConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystemBuilder::new()
//!         .with_config(CacheConfig::from_env()?)
//!         .build()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom store
//!
//! ```rust,ignore
//! use entity_cache::CacheSystemBuilder;
//! use std::sync::Arc;
//!
//! let cache = CacheSystemBuilder::new()
//!     .with_store(Arc::new(MyStore::new()))
//!     .build()
//!     .await?;
//! ```

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::backends::DashMapCache;
use crate::config::{BackendConfig, CacheConfig, ReadFailurePolicy, RefreshConfig};
use crate::traits::RemoteStore;
use crate::{CacheManager, CacheSystem};

/// Builder for constructing a [`CacheSystem`]
///
/// Without a custom store, `build()` connects to the backend named by the
/// configuration (Redis at `redis://127.0.0.1:6379` by default).
pub struct CacheSystemBuilder {
    config: CacheConfig,
    store: Option<Arc<dyn RemoteStore>>,
}

impl CacheSystemBuilder {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            store: None,
        }
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already constructed store instead of `config.backend`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set background refresh limits
    #[must_use]
    pub fn with_refresh(mut self, refresh: RefreshConfig) -> Self {
        self.config.refresh = refresh;
        self
    }

    /// Set what reads do when the store fails
    #[must_use]
    pub fn with_read_failure_policy(mut self, policy: ReadFailurePolicy) -> Self {
        self.config.read_failure = policy;
        self
    }

    /// Expire every written entry after `ttl`
    #[must_use]
    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.config.entry_ttl = Some(ttl);
        self
    }

    /// Build the `CacheSystem`
    ///
    /// # Errors
    ///
    /// Fails when the configured backend cannot be reached or was compiled out.
    pub async fn build(self) -> Result<CacheSystem> {
        let store = match self.store {
            Some(store) => {
                info!(store = store.name(), "Using custom cache store");
                store
            }
            None => connect(&self.config.backend).await?,
        };

        let cache_manager = Arc::new(CacheManager::with_options(
            store,
            self.config.refresh,
            self.config.read_failure,
            self.config.entry_ttl,
        ));

        info!("Entity cache system built");
        Ok(CacheSystem { cache_manager })
    }
}

impl Default for CacheSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect(backend: &BackendConfig) -> Result<Arc<dyn RemoteStore>> {
    match backend {
        #[cfg(feature = "http")]
        BackendConfig::Http(http) => Ok(Arc::new(crate::backends::HttpCache::new(http.clone())?)),
        #[cfg(not(feature = "http"))]
        BackendConfig::Http(_) => anyhow::bail!("HTTP backend requested but the `http` feature is disabled"),

        #[cfg(feature = "redis")]
        BackendConfig::Redis { url } => Ok(Arc::new(crate::backends::RedisCache::with_url(url).await?)),
        #[cfg(not(feature = "redis"))]
        BackendConfig::Redis { .. } => anyhow::bail!("Redis backend requested but the `redis` feature is disabled"),

        BackendConfig::InMemory => Ok(Arc::new(DashMapCache::new())),
    }
}
