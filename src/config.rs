//! Cache Configuration
//!
//! Settings are plain structs with sensible defaults. [`CacheConfig::from_env`]
//! reads them from environment variables:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `CACHE_BACKEND` | `http`, `redis` or `memory` | `http` if `CACHE_REST_URL` is set, else `redis` |
//! | `CACHE_REST_URL` / `CACHE_REST_TOKEN` | REST store endpoint and bearer token | - |
//! | `REDIS_URL` | Redis connection string | `redis://127.0.0.1:6379` |
//! | `CACHE_REFRESH_CONCURRENCY` | Max concurrent background refreshes | `32` |
//! | `CACHE_REFRESH_TIMEOUT_SECS` | Timeout of one background refresh | `10` |
//! | `CACHE_ENTRY_TTL_SECS` | Optional expiry safety net | unset (no expiry) |
//! | `CACHE_FAIL_CLOSED` | `true` to surface store read failures | `false` |

use anyhow::{Context, Result, bail};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default Redis URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Connection settings for the REST key-value store
#[derive(Debug, Clone)]
pub struct HttpCacheConfig {
    /// Base URL, e.g. `https://cache.example.com`
    pub base_url: String,
    /// Bearer credential
    pub token: String,
    /// Per-request timeout (default: 5 seconds)
    pub request_timeout: Duration,
}

impl HttpCacheConfig {
    /// Create a config with the default timeout
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the per-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Which remote store to connect to
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// REST key-value service
    Http(HttpCacheConfig),
    /// Native Redis
    Redis {
        /// Redis connection string
        url: String,
    },
    /// In-process `DashMap` store (not shared between processes)
    InMemory,
}

/// Limits for background refreshes triggered by cache hits
#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    /// Maximum refreshes running at once; extra refreshes are skipped
    pub max_concurrent: usize,
    /// Timeout applied to each refresh (loader + store write)
    pub timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 32,
            timeout: Duration::from_secs(10),
        }
    }
}

/// What a read does when the store itself fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadFailurePolicy {
    /// Treat the failed read as a miss and load from the source of truth
    #[default]
    FailOpen,
    /// Return the transport error to the caller
    FailClosed,
}

/// Top-level cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Remote store
    pub backend: BackendConfig,
    /// Background refresh limits
    pub refresh: RefreshConfig,
    /// Behaviour when a store read fails
    pub read_failure: ReadFailurePolicy,
    /// Optional expiry for every written entry
    ///
    /// `None` keeps entries until they are invalidated. A value bounds how
    /// long an entry can stay stale when a write path misses its invalidation.
    pub entry_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Redis {
                url: DEFAULT_REDIS_URL.to_string(),
            },
            refresh: RefreshConfig::default(),
            read_failure: ReadFailurePolicy::default(),
            entry_ttl: None,
        }
    }
}

impl CacheConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error for unknown backends, missing REST credentials or
    /// unparsable numbers.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// See [`CacheConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rest_url = lookup("CACHE_REST_URL");
        let backend_name = lookup("CACHE_BACKEND").unwrap_or_else(|| {
            if rest_url.is_some() { "http" } else { "redis" }.to_string()
        });

        let backend = match backend_name.to_ascii_lowercase().as_str() {
            "http" => {
                let base_url = rest_url.context("CACHE_REST_URL is required for the http backend")?;
                let token = lookup("CACHE_REST_TOKEN").context("CACHE_REST_TOKEN is required for the http backend")?;
                BackendConfig::Http(HttpCacheConfig::new(base_url, token))
            }
            "redis" => BackendConfig::Redis {
                url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            },
            "memory" => BackendConfig::InMemory,
            other => bail!("Unknown CACHE_BACKEND '{other}' (expected http, redis or memory)"),
        };

        let defaults = RefreshConfig::default();
        let refresh = RefreshConfig {
            max_concurrent: parse_var(&lookup, "CACHE_REFRESH_CONCURRENCY")?.unwrap_or(defaults.max_concurrent),
            timeout: parse_var(&lookup, "CACHE_REFRESH_TIMEOUT_SECS")?
                .map_or(defaults.timeout, Duration::from_secs),
        };
        if refresh.max_concurrent > Semaphore::MAX_PERMITS {
            bail!(
                "CACHE_REFRESH_CONCURRENCY {} exceeds the maximum of {}",
                refresh.max_concurrent,
                Semaphore::MAX_PERMITS
            );
        }

        let read_failure = if parse_var::<bool, _>(&lookup, "CACHE_FAIL_CLOSED")?.unwrap_or(false) {
            ReadFailurePolicy::FailClosed
        } else {
            ReadFailurePolicy::FailOpen
        };

        Ok(Self {
            backend,
            refresh,
            read_failure,
            entry_ttl: parse_var(&lookup, "CACHE_ENTRY_TTL_SECS")?.map(Duration::from_secs),
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("Invalid value for {name}: '{raw}'")))
        .transpose()
}
