//! Cache Manager - Read-Through Accessor
//!
//! Turns point lookups and list queries into cached reads:
//!
//! ```text
//! get_or_load(key, loader)
//!   ├─ store.get(key) ── hit ──> decode & return ──> background refresh (loader → set)
//!   └─ miss ──> single-flight(key): loader → encode → set ──> decode & return
//! ```
//!
//! Hits are stale-while-revalidate: the caller gets the stored value at once
//! and a detached refresh replaces it for later readers. Misses are coalesced
//! so concurrent callers trigger exactly one loader execution.
//!
//! Loads do not write over invalidations. Every delete or direct write bumps
//! the write epoch of its namespace, and a load whose namespace epoch moved
//! while its loader ran hands its value to the waiters without storing it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codecs::JsonCodec;
use crate::config::{ReadFailurePolicy, RefreshConfig};
use crate::error::{CacheError, CacheResult};
use crate::key::{is_pattern, namespace_of};
use crate::refresh::RefreshPool;
use crate::single_flight::SingleFlight;
use crate::traits::RemoteStore;

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    read_failures: AtomicU64,
    load_failures: AtomicU64,
    decode_failures: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    invalidations: AtomicU64,
    discarded_loads: AtomicU64,
}

/// Write epochs observed by a load before it called its loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    global: u64,
    namespace: u64,
}

/// Per-namespace write epochs
///
/// Patterns whose namespace segment is itself a wildcard bump the global
/// epoch, which every namespace observes.
#[derive(Debug, Default)]
struct WriteEpochs {
    global: AtomicU64,
    namespaces: DashMap<String, u64>,
}

impl WriteEpochs {
    fn current(&self, key: &str) -> Epoch {
        Epoch {
            global: self.global.load(Ordering::Acquire),
            namespace: self
                .namespaces
                .get(namespace_of(key))
                .map_or(0, |epoch| *epoch),
        }
    }

    fn bump(&self, key_or_pattern: &str) {
        let namespace = namespace_of(key_or_pattern);
        if is_pattern(namespace) {
            self.global.fetch_add(1, Ordering::AcqRel);
        } else {
            *self.namespaces.entry(namespace.to_string()).or_insert(0) += 1;
        }
    }
}

/// Cache Manager - the read-through protocol over one remote store
pub struct CacheManager {
    store: Arc<dyn RemoteStore>,
    codec: JsonCodec,
    flights: Arc<SingleFlight<String>>,
    refresh: RefreshPool,
    read_failure: ReadFailurePolicy,
    entry_ttl: Option<Duration>,
    counters: Arc<Counters>,
    epochs: Arc<WriteEpochs>,
}

impl CacheManager {
    /// Create a manager with default refresh limits and no entry TTL
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self::with_options(
            store,
            RefreshConfig::default(),
            ReadFailurePolicy::default(),
            None,
        )
    }

    /// Create a manager with explicit options
    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        refresh: RefreshConfig,
        read_failure: ReadFailurePolicy,
        entry_ttl: Option<Duration>,
    ) -> Self {
        info!(
            store = store.name(),
            refresh_concurrency = refresh.max_concurrent,
            refresh_timeout_ms = u64::try_from(refresh.timeout.as_millis()).unwrap_or(u64::MAX),
            read_failure = ?read_failure,
            entry_ttl_secs = entry_ttl.map(|ttl| ttl.as_secs()),
            "Initializing Cache Manager"
        );

        Self {
            store,
            codec: JsonCodec,
            flights: Arc::new(SingleFlight::new()),
            refresh: RefreshPool::new(refresh),
            read_failure,
            entry_ttl,
            counters: Arc::new(Counters::default()),
            epochs: Arc::new(WriteEpochs::default()),
        }
    }

    /// Get a value from the cache, loading it through `loader` on a miss
    ///
    /// # Cache Flow
    ///
    /// 1. Read `key` from the store
    /// 2. **Hit**: decode and return; a detached refresh runs `loader` and
    ///    overwrites the entry. Refresh failures are logged and never reach
    ///    the caller.
    /// 3. **Miss**: join or start the single flight for `key`, which runs
    ///    `loader`, stores the encoded value and hands the payload to every
    ///    waiter.
    /// 4. Decode into `T`. Decode failures are returned on both paths.
    ///
    /// A store read failure counts as a miss under
    /// [`ReadFailurePolicy::FailOpen`] and is returned under `FailClosed`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use entity_cache::CacheManager;
    /// # use serde::{Deserialize, Serialize};
    /// #[derive(Serialize, Deserialize)]
    /// struct User {
    ///     id: u64,
    ///     name: String,
    /// }
    ///
    /// # async fn example(cache_manager: &CacheManager) -> entity_cache::CacheResult<()> {
    /// let user: User = cache_manager
    ///     .get_or_load("user:byid:5", || async {
    ///         // Your database query here
    ///         anyhow::Ok(User { id: 5, name: "Ada".into() })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// - `Loader*` when the coalesced load failed (miss path only)
    /// - `Serialization` when the payload does not decode into `T`, or the
    ///   loaded value cannot be encoded
    /// - transport errors only under `ReadFailurePolicy::FailClosed`
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, loader: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(payload) = self.read(key).await? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "[HIT] Serving cached value, refreshing in background");
            self.refresh_in_background(key, loader);
            return self.decode(key, &payload);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "[MISS] Loading from source (single-flight)");

        let work = load_and_store(
            Arc::clone(&self.store),
            self.codec,
            key.to_string(),
            self.entry_ttl,
            Arc::clone(&self.counters),
            Arc::clone(&self.epochs),
            loader,
        );
        let payload = match self.flights.run(key, move || work).await {
            Ok(payload) => payload,
            Err(err) => {
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };

        self.decode(key, &payload)
    }

    fn refresh_in_background<T, F, Fut>(&self, key: &str, loader: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if self.flights.in_flight(key) {
            debug!(key = %key, "Load already in flight, no extra refresh");
            return;
        }

        let work = load_and_store(
            Arc::clone(&self.store),
            self.codec,
            key.to_string(),
            self.entry_ttl,
            Arc::clone(&self.counters),
            Arc::clone(&self.epochs),
            loader,
        );
        self.refresh.dispatch(key, &self.flights, work);
    }

    async fn read(&self, key: &str) -> CacheResult<Option<String>> {
        match self.store.get(key).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                match self.read_failure {
                    ReadFailurePolicy::FailOpen => {
                        warn!(key = %key, error = %err, "Cache read failed, treating as miss");
                        Ok(None)
                    }
                    ReadFailurePolicy::FailClosed => Err(err),
                }
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, payload: &str) -> CacheResult<T> {
        self.codec.decode(payload).inspect_err(|err| {
            self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                key = %key,
                target_type = std::any::type_name::<T>(),
                error = %err,
                "Cached payload does not match expected type"
            );
        })
    }

    /// Encode a value with the manager's codec
    ///
    /// # Errors
    ///
    /// `CacheError::Serialization` if the value cannot be encoded.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<String> {
        self.codec.encode(value)
    }

    /// Store an already encoded payload under `key`
    ///
    /// # Errors
    ///
    /// Transport failures; the caller decides whether they matter.
    pub async fn set_payload(&self, key: &str, payload: &str) -> CacheResult<()> {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.epochs.bump(key);
        self.store
            .set(key, payload, self.entry_ttl)
            .await
            .inspect_err(|_| {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            })
    }

    /// Encode and store a value under `key`
    ///
    /// # Errors
    ///
    /// Encoding or transport failures.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let payload = self.encode(value)?;
        self.set_payload(key, &payload).await
    }

    /// Delete a key or a trailing-wildcard pattern
    ///
    /// # Errors
    ///
    /// Transport failures; the caller decides whether they matter.
    pub async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64> {
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        // Before the store call, so a load racing this delete sees the bump
        self.epochs.bump(key_or_pattern);
        let removed = self
            .store
            .delete(key_or_pattern)
            .await
            .inspect_err(|_| {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            })?;
        debug!(key = %key_or_pattern, removed = removed, "Invalidated cache entries");
        Ok(removed)
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Check the underlying store
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Get comprehensive cache statistics
    #[must_use]
    pub fn get_stats(&self) -> CacheManagerStats {
        let counters = &self.counters;
        let total_requests = counters.total_requests.load(Ordering::Relaxed);
        let hits = counters.hits.load(Ordering::Relaxed);
        let refresh = self.refresh.stats();

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total_requests > 0 {
            (hits as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        CacheManagerStats {
            total_requests,
            hits,
            misses: counters.misses.load(Ordering::Relaxed),
            hit_rate,
            loads: self.flights.executions(),
            coalesced: self.flights.coalesced(),
            load_failures: counters.load_failures.load(Ordering::Relaxed),
            read_failures: counters.read_failures.load(Ordering::Relaxed),
            decode_failures: counters.decode_failures.load(Ordering::Relaxed),
            refreshes_started: refresh.started,
            refreshes_skipped: refresh.skipped,
            refreshes_succeeded: refresh.succeeded,
            refreshes_failed: refresh.failed,
            writes: counters.writes.load(Ordering::Relaxed),
            write_failures: counters.write_failures.load(Ordering::Relaxed),
            invalidations: counters.invalidations.load(Ordering::Relaxed),
            discarded_loads: counters.discarded_loads.load(Ordering::Relaxed),
            in_flight: self.flights.len(),
        }
    }
}

/// Run the loader, encode its value and store it
///
/// Shared by the miss path and background refreshes. The write epoch is read
/// when the work is built, before the loader can run. If the namespace was
/// written or invalidated by the time the value is ready, it is returned to
/// the waiters but not stored; a write that lands after the check is undone.
///
/// A failed store write is logged and the payload is still returned: the
/// value itself is trustworthy.
fn load_and_store<T, F, Fut>(
    store: Arc<dyn RemoteStore>,
    codec: JsonCodec,
    key: String,
    ttl: Option<Duration>,
    counters: Arc<Counters>,
    epochs: Arc<WriteEpochs>,
    loader: F,
) -> impl Future<Output = CacheResult<String>> + Send + 'static
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let seen = epochs.current(&key);

    async move {
        let value = loader().await.map_err(CacheError::loader)?;
        let payload = codec.encode(&value)?;

        if epochs.current(&key) != seen {
            counters.discarded_loads.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Namespace written during load, not storing loaded value");
            return Ok(payload);
        }

        counters.writes.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = store.set(&key, &payload, ttl).await {
            counters.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %err, "Failed to store loaded value, serving it uncached");
            return Ok(payload);
        }

        if epochs.current(&key) == seen {
            debug!(key = %key, "Stored loaded value");
        } else {
            counters.discarded_loads.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = store.delete(&key).await {
                counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %err, "Failed to drop value stored across an invalidation");
            } else {
                debug!(key = %key, "Namespace written during store, dropped loaded value");
            }
        }

        Ok(payload)
    }
}

/// Cache Manager statistics
#[derive(Debug, Clone)]
pub struct CacheManagerStats {
    /// `get_or_load` calls
    pub total_requests: u64,
    /// Reads answered from the store
    pub hits: u64,
    /// Reads that went to the loader
    pub misses: u64,
    /// `hits / total_requests` in percent
    pub hit_rate: f64,
    /// Loader executions started through single-flight (misses and refreshes)
    pub loads: u64,
    /// Callers that waited on another caller's load
    pub coalesced: u64,
    /// Miss-path callers that received a load error
    pub load_failures: u64,
    /// Store reads that failed
    pub read_failures: u64,
    /// Payloads that did not decode into the requested type
    pub decode_failures: u64,
    /// Background refreshes dispatched
    pub refreshes_started: u64,
    /// Background refreshes dropped because the pool was full
    pub refreshes_skipped: u64,
    /// Background refreshes that completed
    pub refreshes_succeeded: u64,
    /// Background refreshes that failed or timed out
    pub refreshes_failed: u64,
    /// Store writes attempted
    pub writes: u64,
    /// Store writes and deletes that failed
    pub write_failures: u64,
    /// Deletes attempted
    pub invalidations: u64,
    /// Loaded values not stored because the namespace was written meanwhile
    pub discarded_loads: u64,
    /// Loads currently in flight
    pub in_flight: usize,
}
