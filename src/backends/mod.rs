//! Remote Store Implementations
//!
//! # Available Backends
//!
//! - **HTTP** - REST key-value service with bearer auth (feature: `http`, default)
//! - **Redis** - Native Redis through `ConnectionManager` (feature: `redis`, default)
//! - **`DashMap`** - In-process store for tests, demos and single instances
//!
//! # Usage
//!
//! ```rust,no_run
//! use entity_cache::backends::{DashMapCache, RedisCache};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let local = DashMapCache::new();
//! let redis = RedisCache::with_url("redis://localhost:6379").await?;
//! # Ok(())
//! # }
//! ```

pub mod dashmap_cache;

#[cfg(feature = "http")]
pub mod http_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use dashmap_cache::DashMapCache;

#[cfg(feature = "http")]
pub use http_cache::HttpCache;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
