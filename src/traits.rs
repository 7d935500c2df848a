//! Cache Traits
//!
//! The seams of the cache layer:
//!
//! - `RemoteStore`: the shared key-value service (HTTP, Redis, in-memory)
//! - `CachedEntity`: which keys an entity occupies, so writes can keep them fresh
//!
//! # Example: Custom Store
//!
//! ```rust,ignore
//! use entity_cache::{RemoteStore, CacheResult, async_trait};
//! use std::time::Duration;
//!
//! struct MyStore {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl RemoteStore for MyStore {
//!     async fn get(&self, key: &str) -> CacheResult<Option<String>> {
//!         // Your implementation
//!     }
//!
//!     async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
//!         // Your implementation
//!     }
//!
//!     async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64> {
//!         // Your implementation
//!     }
//!
//!     async fn health_check(&self) -> bool {
//!         // Your implementation
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::CacheResult;
use crate::key::{CacheKey, KeyParam};

/// Remote key-value store shared by every process of the service
///
/// # Semantics
///
/// - `get` returns `Ok(None)` for a missing key. A miss is not an error, and
///   an empty string is a hit.
/// - `set` is best-effort: callers decide whether a failure matters.
/// - `delete` accepts either one key or a trailing-wildcard pattern
///   (`user:*`). Backends without native pattern deletes must enumerate the
///   matching keys themselves.
///
/// No transactional guarantees are expected: readers may observe values
/// mid-refresh.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the payload stored under `key`
    ///
    /// # Errors
    ///
    /// Transport or protocol failures.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, optionally expiring after `ttl`
    ///
    /// # Errors
    ///
    /// Transport or protocol failures.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key, or every key under a `prefix*` pattern
    ///
    /// Returns the number of keys removed.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures.
    async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64>;

    /// Check that the store is reachable and accepts writes
    async fn health_check(&self) -> bool;

    /// Store name, used in logs
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// One lookup dimension an entity is cached under
///
/// `operation` plus `params` produce the detail key inside the entity's
/// namespace, e.g. `("byid", ["5"])` -> `user:byid:5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailKey {
    /// Operation name (`byid`, `byemail`, ...)
    pub operation: &'static str,
    /// Ordered, already formatted params
    pub params: Vec<String>,
}

impl DetailKey {
    /// Create a detail key from any `Display` params
    #[must_use]
    pub fn new(operation: &'static str, params: &[KeyParam<'_>]) -> Self {
        Self {
            operation,
            params: params.iter().map(ToString::to_string).collect(),
        }
    }

    /// Full cache key inside `namespace`
    #[must_use]
    pub fn to_cache_key(&self, namespace: &str) -> CacheKey {
        let params: Vec<KeyParam<'_>> = self.params.iter().map(|p| p as KeyParam<'_>).collect();
        CacheKey::build(namespace, self.operation, &params)
    }
}

/// An entity whose cache entries are maintained on write
///
/// # Example
///
/// ```rust
/// use entity_cache::{CachedEntity, DetailKey};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     email: String,
/// }
///
/// impl CachedEntity for User {
///     const NAMESPACE: &'static str = "user";
///
///     fn detail_keys(&self) -> Vec<DetailKey> {
///         vec![
///             DetailKey::new("byid", &[&self.id]),
///             DetailKey::new("byemail", &[&self.email]),
///         ]
///     }
///
///     fn list_operations() -> &'static [&'static str] {
///         &["list", "count"]
///     }
/// }
/// ```
pub trait CachedEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Namespace every key of this entity lives under
    const NAMESPACE: &'static str;

    /// Every detail dimension this entity is cached under (primary id,
    /// alternate unique fields, foreign-key groupings)
    fn detail_keys(&self) -> Vec<DetailKey>;

    /// List and aggregate operations whose results depend on this entity
    fn list_operations() -> &'static [&'static str];
}
