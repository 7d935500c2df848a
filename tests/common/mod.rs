//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - In-memory and fault-injecting stores
//! - Test entities
//! - Cache system setup helpers

#![allow(dead_code)]

use entity_cache::{
    async_trait, CacheManager, CacheResult, CacheSystem, CacheSystemBuilder, DashMapCache, ReadFailurePolicy,
    RefreshConfig, RemoteStore,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Generate a unique namespace so tests never share keys
pub fn test_namespace(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Store that wraps `DashMapCache` and can be told to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: DashMapCache,
    pub fail_gets: AtomicBool,
    pub fail_sets: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub gets: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn injected(&self, flag: &AtomicBool, command: &str) -> CacheResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(entity_cache::CacheError::Backend(format!("injected {command} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.injected(&self.fail_gets, "GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.injected(&self.fail_sets, "SET")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.injected(&self.fail_deletes, "DEL")?;
        self.inner.delete(key_or_pattern).await
    }

    async fn health_check(&self) -> bool {
        !self.fail_gets.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "Flaky"
    }
}

/// Cache system over a fresh in-memory store, default options
pub fn setup_cache_system() -> (CacheSystem, Arc<DashMapCache>) {
    let store = Arc::new(DashMapCache::new());
    let system = CacheSystem::with_store(Arc::clone(&store) as Arc<dyn RemoteStore>);
    (system, store)
}

/// Cache system whose hits never start a background refresh
pub async fn setup_cache_without_refresh() -> (CacheSystem, Arc<DashMapCache>) {
    let store = Arc::new(DashMapCache::new());
    let system = CacheSystemBuilder::new()
        .with_store(Arc::clone(&store) as Arc<dyn RemoteStore>)
        .with_refresh(RefreshConfig {
            max_concurrent: 0,
            timeout: Duration::from_secs(1),
        })
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to build cache system: {e}"));
    (system, store)
}

/// Cache manager over a fault-injecting store
pub fn setup_flaky(policy: ReadFailurePolicy) -> (Arc<CacheManager>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let manager = Arc::new(CacheManager::with_options(
        Arc::clone(&store) as Arc<dyn RemoteStore>,
        RefreshConfig::default(),
        policy,
        None,
    ));
    (manager, store)
}

/// Wait for an async condition with timeout
pub async fn wait_for<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    use tokio::time::{sleep, Instant};

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Test entities
pub mod test_data {
    use entity_cache::{CachedEntity, DetailKey};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
        pub email: String,
        pub org_id: u64,
        pub roles: Vec<String>,
        pub manager_id: Option<u64>,
    }

    impl User {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
                org_id: id % 3,
                roles: vec!["member".to_string()],
                manager_id: None,
            }
        }

        pub fn named(id: u64, name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::new(id)
            }
        }
    }

    impl CachedEntity for User {
        const NAMESPACE: &'static str = "user";

        fn detail_keys(&self) -> Vec<DetailKey> {
            vec![
                DetailKey::new("byid", &[&self.id]),
                DetailKey::new("byemail", &[&self.email]),
            ]
        }

        fn list_operations() -> &'static [&'static str] {
            &["list", "count", "byorg"]
        }
    }
}
