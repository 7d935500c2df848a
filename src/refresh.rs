//! Background Refresh Pool
//!
//! Cache hits are answered immediately and revalidated in the background
//! (stale-while-revalidate). Refreshes run detached from the request that
//! triggered them, bounded by a semaphore and a timeout. A refresh that cannot
//! get a permit right away is skipped rather than queued: the next hit on the
//! key will try again.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::RefreshConfig;
use crate::error::{CacheError, CacheResult};
use crate::single_flight::SingleFlight;

/// Snapshot of refresh counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    /// Refreshes dispatched to a task
    pub started: u64,
    /// Refreshes dropped because the pool was saturated
    pub skipped: u64,
    /// Refreshes that stored a new value
    pub succeeded: u64,
    /// Refreshes whose loader failed, panicked or timed out
    pub failed: u64,
}

#[derive(Debug, Default)]
struct AtomicRefreshStats {
    started: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl AtomicRefreshStats {
    fn snapshot(&self) -> RefreshStats {
        RefreshStats {
            started: self.started.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Bounded pool of detached refresh tasks
pub struct RefreshPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
    stats: Arc<AtomicRefreshStats>,
}

impl RefreshPool {
    /// Create a pool from its limits
    ///
    /// `max_concurrent` is capped at [`Semaphore::MAX_PERMITS`].
    #[must_use]
    pub fn new(config: RefreshConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent.min(Semaphore::MAX_PERMITS))),
            timeout: config.timeout,
            stats: Arc::new(AtomicRefreshStats::default()),
        }
    }

    /// Dispatch `work` for `key` as a single-flight load on a detached task
    ///
    /// The work is registered in `flights`, so it never overlaps another load
    /// of the same key in this process, and a miss arriving meanwhile waits
    /// for it instead of loading again. The timeout applies inside the flight,
    /// cancelling the work itself.
    ///
    /// Returns `false` when the pool is saturated and the refresh was skipped.
    /// Failures are logged and counted, never returned.
    pub fn dispatch<T, Fut>(&self, key: &str, flights: &Arc<SingleFlight<T>>, work: Fut) -> bool
    where
        T: Clone + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Refresh pool saturated, skipping background refresh");
            return false;
        };

        self.stats.started.fetch_add(1, Ordering::Relaxed);
        let flights = Arc::clone(flights);
        let stats = Arc::clone(&self.stats);
        let timeout = self.timeout;
        let key = key.to_string();

        tokio::spawn(async move {
            let _permit = permit;
            let flight_key = key.clone();
            let outcome = flights
                .run(&key, move || async move {
                    match tokio::time::timeout(timeout, work).await {
                        Ok(result) => result,
                        Err(_) => Err(CacheError::LoaderTimedOut { key: flight_key }),
                    }
                })
                .await;

            match outcome {
                Ok(_) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Background refresh stored a fresh value");
                }
                Err(err @ CacheError::LoaderPanicked { .. }) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(key = %key, error = %err, "Background refresh panicked, keeping cached value");
                }
                Err(err) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %err, "Background refresh failed, keeping cached value");
                }
            }
        });

        true
    }

    /// Permits currently free
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_concurrent: usize, timeout: Duration) -> RefreshPool {
        RefreshPool::new(RefreshConfig {
            max_concurrent,
            timeout,
        })
    }

    async fn wait_idle(pool: &RefreshPool, max_concurrent: usize) {
        for _ in 0..200 {
            if pool.available() == max_concurrent {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("refresh pool never drained");
    }

    #[tokio::test]
    async fn test_saturated_pool_skips() {
        let pool = pool(1, Duration::from_secs(5));
        let flights = Arc::new(SingleFlight::<u32>::new());

        assert!(pool.dispatch("a", &flights, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        }));
        assert!(!pool.dispatch("b", &flights, async { Ok(2) }));

        wait_idle(&pool, 1).await;
        let stats = pool.stats();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_failure_is_counted_not_returned() {
        let pool = pool(4, Duration::from_secs(5));
        let flights = Arc::new(SingleFlight::<u32>::new());

        assert!(pool.dispatch("a", &flights, async {
            Err(CacheError::loader(anyhow::anyhow!("db down")))
        }));

        wait_idle(&pool, 4).await;
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_timeout_cancels_work() {
        let pool = pool(4, Duration::from_millis(20));
        let flights = Arc::new(SingleFlight::<u32>::new());

        assert!(pool.dispatch("slow", &flights, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(1)
        }));

        wait_idle(&pool, 4).await;
        assert_eq!(pool.stats().failed, 1);
        assert!(!flights.in_flight("slow"));
    }

    #[test]
    fn test_oversized_limit_is_capped() {
        let pool = pool(usize::MAX, Duration::from_secs(1));
        assert_eq!(pool.available(), Semaphore::MAX_PERMITS);
    }
}
