//! Repository Caching Example
//!
//! A `UserRepository` composing an `EntityCache` over a mock database:
//! cached point lookups, cached list queries, and cache maintenance after
//! create, update and delete.
//!
//! Uses the in-memory store unless `CACHE_BACKEND` is set.
//!
//! Run with: `RUST_LOG=entity_cache=debug cargo run --example user_repository`

use entity_cache::{CacheResult, CacheSystem, CacheSystemBuilder, CachedEntity, DetailKey, EntityCache};
use entity_cache::config::{BackendConfig, CacheConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
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
        &["list", "count"]
    }
}

/// Mock database table (in real world, use sqlx)
#[derive(Default)]
struct Database {
    rows: RwLock<BTreeMap<u64, User>>,
    queries: AtomicU64,
}

impl Database {
    async fn query<T>(&self, f: impl FnOnce(&BTreeMap<u64, User>) -> T) -> T {
        self.queries.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(50)).await; // Simulate DB latency
        f(&*self.rows.read().await)
    }
}

struct UserRepository {
    db: Arc<Database>,
    cache: EntityCache,
}

impl UserRepository {
    fn new(db: Arc<Database>, system: &CacheSystem) -> Self {
        Self {
            db,
            cache: system.entity_for::<User>(),
        }
    }

    async fn find_by_id(&self, id: u64) -> CacheResult<Option<User>> {
        let db = Arc::clone(&self.db);
        self.cache
            .get_cached_detail("byid", &[&id], move || async move {
                anyhow::Ok(db.query(|rows| rows.get(&id).cloned()).await)
            })
            .await
    }

    async fn find_by_email(&self, email: &str) -> CacheResult<Option<User>> {
        let db = Arc::clone(&self.db);
        let wanted = email.to_string();
        self.cache
            .get_cached_detail("byemail", &[&email], move || async move {
                anyhow::Ok(db.query(|rows| rows.values().find(|u| u.email == wanted).cloned()).await)
            })
            .await
    }

    async fn list(&self, page: usize, per_page: usize) -> CacheResult<Vec<User>> {
        let db = Arc::clone(&self.db);
        self.cache
            .get_cached_list("list", &[&page, &per_page], move || async move {
                anyhow::Ok(db
                    .query(|rows| rows.values().skip(page * per_page).take(per_page).cloned().collect())
                    .await)
            })
            .await
    }

    async fn count(&self) -> CacheResult<usize> {
        let db = Arc::clone(&self.db);
        self.cache
            .get_cached_list("count", &[], move || async move { anyhow::Ok(db.query(BTreeMap::len).await) })
            .await
    }

    async fn save(&self, user: User) {
        self.db.rows.write().await.insert(user.id, user.clone());
        let report = self.cache.saved(&user).await;
        if !report.is_clean() {
            tracing::warn!(failed = report.failed, "Cache maintenance incomplete after save");
        }
    }

    async fn delete(&self, id: u64) {
        let removed = self.db.rows.write().await.remove(&id);
        if let Some(user) = removed {
            self.cache.deleted(&user).await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🎯 Repository Caching Example\n");

    let config = if std::env::var("CACHE_BACKEND").is_ok() {
        CacheConfig::from_env()?
    } else {
        CacheConfig {
            backend: BackendConfig::InMemory,
            ..CacheConfig::default()
        }
    };
    let system = CacheSystemBuilder::new().with_config(config).build().await?;

    let db = Arc::new(Database::default());
    let users = UserRepository::new(Arc::clone(&db), &system);

    for id in 1..=5 {
        users
            .save(User {
                id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
            })
            .await;
    }
    println!("✅ Seeded 5 users (detail entries written through)\n");

    // ========================================
    // Detail reads
    // ========================================
    println!("📊 Detail reads");
    let before = db.queries.load(Ordering::Relaxed);
    let ada = users.find_by_id(3).await?;
    let by_email = users.find_by_email("user3@example.com").await?;
    println!("  byid(3)    -> {ada:?}");
    println!("  byemail    -> {by_email:?}");
    println!(
        "  DB queries issued: {} (hits are revalidated in the background)\n",
        db.queries.load(Ordering::Relaxed) - before
    );

    // ========================================
    // Concurrent misses
    // ========================================
    println!("📊 10 concurrent list requests on a cold key");
    let users = Arc::new(users);
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let users = Arc::clone(&users);
            tokio::spawn(async move { users.list(0, 3).await })
        })
        .collect();
    for handle in handles {
        let page = handle.await??;
        assert_eq!(page.len(), 3);
    }
    println!("  Coalesced callers: {}\n", system.cache_manager().get_stats().coalesced);

    // ========================================
    // Writes
    // ========================================
    println!("📊 Update, then delete");
    println!("  count before: {}", users.count().await?);
    users
        .save(User {
            id: 6,
            name: "Ada".into(),
            email: "ada@example.com".into(),
        })
        .await;
    println!("  count after save: {} (list entries were invalidated)", users.count().await?);

    users.delete(6).await;
    println!("  byid(6) after delete: {:?}\n", users.find_by_id(6).await?);

    let stats = system.cache_manager().get_stats();
    println!("📈 Final Cache Statistics");
    println!("─────────────────────────");
    println!("Total requests: {}", stats.total_requests);
    println!("Hits: {}", stats.hits);
    println!("Misses: {}", stats.misses);
    println!("Hit rate: {:.2}%", stats.hit_rate);
    println!("Loads: {} ({} coalesced)", stats.loads, stats.coalesced);
    println!("Refreshes: {} started, {} skipped", stats.refreshes_started, stats.refreshes_skipped);
    println!("Invalidations: {}", stats.invalidations);

    Ok(())
}
