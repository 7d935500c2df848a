//! Entity Cache - the repository-facing API
//!
//! An [`EntityCache`] is the cache layer as one repository sees it: a handle on
//! the shared [`CacheManager`] bound to the repository's namespace. Each
//! repository receives its own handle by composition; the handles are cheap
//! to clone and share the process-wide single-flight registry and refresh pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use entity_cache::{CacheSystem, EntityCache};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! struct UserRepository {
//!     cache: EntityCache,
//! }
//!
//! impl UserRepository {
//!     async fn find_by_id(&self, id: u64) -> entity_cache::CacheResult<User> {
//!         self.cache
//!             .get_cached_detail("byid", &[&id], move || async move {
//!                 // SELECT ... WHERE id = $1
//!                 anyhow::Ok(User { id, name: "Ada".into() })
//!             })
//!             .await
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let system = CacheSystem::new().await?;
//! let users = UserRepository { cache: system.entity("user") };
//! let user = users.find_by_id(5).await?;
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::cache_manager::CacheManager;
use crate::error::CacheResult;
use crate::invalidation::{InvalidationManager, InvalidationReport};
use crate::key::{CacheKey, KeyParam};
use crate::traits::CachedEntity;

/// Cache handle scoped to one entity namespace
#[derive(Clone)]
pub struct EntityCache {
    namespace: Arc<str>,
    manager: Arc<CacheManager>,
    writes: InvalidationManager,
}

impl EntityCache {
    /// Bind `manager` to `namespace`
    pub fn new(namespace: impl Into<Arc<str>>, manager: Arc<CacheManager>) -> Self {
        Self {
            namespace: namespace.into(),
            writes: InvalidationManager::new(Arc::clone(&manager)),
            manager,
        }
    }

    /// Bind `manager` to the namespace of `E`
    pub fn for_entity<E: CachedEntity>(manager: Arc<CacheManager>) -> Self {
        Self::new(E::NAMESPACE, manager)
    }

    /// Namespace of this handle
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key for `operation` and `params` inside this namespace
    #[must_use]
    pub fn key(&self, operation: &str, params: &[KeyParam<'_>]) -> CacheKey {
        CacheKey::build(&self.namespace, operation, params)
    }

    /// Read one entity through the cache
    ///
    /// # Errors
    ///
    /// See [`CacheManager::get_or_load`].
    pub fn get_cached_detail<T, F, Fut>(
        &self,
        operation: &str,
        params: &[KeyParam<'_>],
        loader: F,
    ) -> impl Future<Output = CacheResult<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        // Params are formatted up front so the future does not hold them
        let key = self.key(operation, params);
        async move { self.manager.get_or_load(key.as_str(), loader).await }
    }

    /// Read a collection or aggregate through the cache
    ///
    /// List entries are not rewritten on entity writes; they are deleted by
    /// [`EntityCache::invalidate_cache`] or [`EntityCache::saved`] and
    /// re-derived on the next read.
    ///
    /// # Errors
    ///
    /// See [`CacheManager::get_or_load`].
    pub fn get_cached_list<T, F, Fut>(
        &self,
        operation: &str,
        params: &[KeyParam<'_>],
        loader: F,
    ) -> impl Future<Output = CacheResult<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = self.key(operation, params);
        async move { self.manager.get_or_load(key.as_str(), loader).await }
    }

    /// Store a known value as the detail entry for `operation` and `params`
    pub fn cache_detail<'a, T>(
        &'a self,
        operation: &str,
        value: &'a T,
        params: &[KeyParam<'_>],
    ) -> impl Future<Output = InvalidationReport> + Send + 'a
    where
        T: Serialize + Sync + ?Sized,
    {
        let key = self.key(operation, params);
        async move { self.writes.cache_detail(&key, value).await }
    }

    /// Delete the cached results of `operations`
    pub async fn invalidate_cache(&self, operations: &[&str]) -> InvalidationReport {
        self.writes.invalidate_operations(&self.namespace, operations).await
    }

    /// Delete every entry of this namespace
    pub async fn invalidate_all_cache(&self) -> InvalidationReport {
        self.writes.invalidate_namespace(&self.namespace).await
    }

    /// Bring the cache in line after `entity` was created or updated
    pub async fn saved<E: CachedEntity>(&self, entity: &E) -> InvalidationReport {
        self.writes.on_write(entity).await
    }

    /// Bring the cache in line after an entity of type `E` was deleted
    pub async fn deleted<E: CachedEntity>(&self, _entity: &E) -> InvalidationReport {
        self.writes.on_delete::<E>().await
    }

    /// Shared cache manager
    #[must_use]
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }
}
