//! Single-Flight Coordinator
//!
//! Process-local registry guaranteeing at most one in-flight load per key.
//! Concurrent callers for the same key share one execution and all receive
//! the same result, value or error.
//!
//! Each load runs on its own tokio task. A waiter that gives up does not
//! cancel the load for the others, and the task deregisters its own entry
//! before publishing the result, so a caller arriving afterwards starts a
//! fresh load. Nothing is coordinated across processes.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

use crate::error::{CacheError, CacheResult};

type SharedLoad<T> = Shared<BoxFuture<'static, CacheResult<T>>>;

/// One registered load
struct Flight<T: Clone> {
    /// Distinguishes successive flights for the same key
    id: u64,
    load: SharedLoad<T>,
}

/// RAII guard removing a flight when its task ends, including on panic
struct FlightGuard<T: Clone> {
    flights: Arc<DashMap<String, Flight<T>>>,
    key: String,
    id: u64,
}

impl<T: Clone> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let id = self.id;
        self.flights.remove_if(&self.key, |_, flight| flight.id == id);
    }
}

/// Request coalescing registry keyed by cache key
///
/// # Example
///
/// ```rust
/// use entity_cache::SingleFlight;
///
/// # async fn example() -> entity_cache::CacheResult<()> {
/// let flights = SingleFlight::<String>::new();
/// let value = flights
///     .run("user:byid:5", || async { Ok("loaded".to_string()) })
///     .await?;
/// assert_eq!(value, "loaded");
/// # Ok(())
/// # }
/// ```
pub struct SingleFlight<T: Clone> {
    flights: Arc<DashMap<String, Flight<T>>>,
    next_id: AtomicU64,
    executions: AtomicU64,
    coalesced: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Run `f` for `key` unless a load is already in flight, in which case
    /// wait for that load's result instead
    ///
    /// `f` is only invoked by the caller that registers the flight; joiners
    /// drop theirs unused.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, shared by every waiter, or
    /// `CacheError::LoaderPanicked` if the load task panicked.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let load = match self.flights.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Joining in-flight load");
                entry.get().load.clone()
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let guard = FlightGuard {
                    flights: Arc::clone(&self.flights),
                    key: key.to_string(),
                    id,
                };

                // The guard is dropped inside the task, so the entry is gone
                // before any waiter observes the result.
                let task = tokio::spawn(async move {
                    let _guard = guard;
                    f().await
                });

                let task_key = key.to_string();
                let load = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(join_err) => {
                            error!(key = %task_key, error = %join_err, "Load task did not complete");
                            Err(CacheError::LoaderPanicked { key: task_key })
                        }
                    }
                }
                .boxed()
                .shared();

                entry.insert(Flight {
                    id,
                    load: load.clone(),
                });
                self.executions.fetch_add(1, Ordering::Relaxed);
                load
            }
        };

        load.await
    }

    /// `true` while a load for `key` is registered
    #[must_use]
    pub fn in_flight(&self, key: &str) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of loads currently registered
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// `true` when no load is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Loads started so far
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Callers that attached to an existing load instead of starting one
    #[must_use]
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
