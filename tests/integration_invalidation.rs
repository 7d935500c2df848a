//! Integration tests for cache invalidation
//!
//! Tests write-driven maintenance: detail rewrites, list invalidation and
//! namespace wipes.

mod common;

use common::test_data::User;
use common::*;
use entity_cache::{EntityCache, ReadFailurePolicy, RemoteStore};
use futures_util::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counting_loader<T: Send + 'static>(
    calls: &Arc<AtomicU32>,
    value: T,
) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
        .boxed()
    }
}

/// Invalidating `list` forces the next list read to load
#[tokio::test]
async fn test_invalidate_operation_forces_reload() {
    let (cache, store) = setup_cache_without_refresh().await;
    let users = cache.entity("user");
    let calls = Arc::new(AtomicU32::new(0));

    let page: Vec<User> = users
        .get_cached_list("list", &[&1], counting_loader(&calls, vec![User::new(1)]))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);

    let report = users.invalidate_cache(&["list"]).await;
    assert!(report.is_clean());
    assert_eq!(report.attempted, 2, "exact key and parameterized pattern");
    assert!(store.get("user:list:1").await.unwrap().is_none());

    let page: Vec<User> = users
        .get_cached_list("list", &[&1], counting_loader(&calls, vec![User::new(1), User::new(2)]))
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Operation invalidation removes the bare key and every parameterized key,
/// and nothing else
#[tokio::test]
async fn test_invalidate_operation_scope() {
    let (cache, store) = setup_cache_without_refresh().await;
    let users = cache.entity("user");

    for key in ["user:count", "user:count:active", "user:count:org:1", "user:countries", "user:byid:1"] {
        store.set(key, "1", None).await.unwrap();
    }

    users.invalidate_cache(&["count"]).await;

    assert_eq!(store.keys(), vec!["user:byid:1".to_string(), "user:countries".to_string()]);
}

/// Saving an entity rewrites every detail key and drops list keys
#[tokio::test]
async fn test_saved_rewrites_details_and_drops_lists() {
    let (cache, store) = setup_cache_without_refresh().await;
    let users = cache.entity_for::<User>();
    let calls = Arc::new(AtomicU32::new(0));

    let original = User::named(5, "Ada");
    users.cache_detail("byid", &original, &[&5]).await;
    users.cache_detail("byemail", &original, &[&original.email]).await;
    let _: Vec<User> = users
        .get_cached_list("list", &[], counting_loader(&calls, vec![original.clone()]))
        .await
        .unwrap();
    let _: u64 = users
        .get_cached_list("byorg", &[&original.org_id], counting_loader(&calls, 1_u64))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let updated = User::named(5, "Ada Lovelace");
    let report = users.saved(&updated).await;
    assert!(report.is_clean());
    // 2 detail writes + 3 list operations x (exact + pattern)
    assert_eq!(report.attempted, 8);

    let by_id: User = users
        .get_cached_detail("byid", &[&5], counting_loader(&calls, User::named(5, "stale")))
        .await
        .unwrap();
    let by_email: User = users
        .get_cached_detail("byemail", &[&updated.email], counting_loader(&calls, User::named(5, "stale")))
        .await
        .unwrap();
    assert_eq!(by_id, updated);
    assert_eq!(by_email, updated);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "detail reads must be hits");

    assert!(store.get("user:list").await.unwrap().is_none());
    assert!(store.get("user:byorg:2").await.unwrap().is_none());

    let _: Vec<User> = users
        .get_cached_list("list", &[], counting_loader(&calls, vec![updated.clone()]))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3, "list read must reload");
}

/// Deleting an entity wipes its namespace and leaves other namespaces alone
#[tokio::test]
async fn test_deleted_wipes_namespace() {
    let (cache, store) = setup_cache_without_refresh().await;
    let users = cache.entity_for::<User>();
    let posts = cache.entity("post");

    let user = User::new(3);
    users.saved(&user).await;
    users.cache_detail("list", &vec![user.clone()], &[]).await;
    posts.cache_detail("byid", &"hello", &[&1]).await;
    store.set("userprofile:byid:3", "{}", None).await.unwrap();

    let report = users.deleted(&user).await;
    assert!(report.is_clean());

    assert_eq!(
        store.keys(),
        vec!["post:byid:1".to_string(), "userprofile:byid:3".to_string()]
    );
}

/// Wiping a namespace by hand
#[tokio::test]
async fn test_invalidate_all_cache() {
    let (cache, store) = setup_cache_without_refresh().await;
    let users = cache.entity("user");

    users.cache_detail("byid", &User::new(1), &[&1]).await;
    users.cache_detail("byid", &User::new(2), &[&2]).await;
    assert_eq!(store.len(), 2);

    users.invalidate_all_cache().await;
    assert!(store.is_empty());
    assert_eq!(cache.cache_manager().get_stats().invalidations, 1);
}

/// Store failures during maintenance are reported, never raised
#[tokio::test]
async fn test_partial_failure_is_not_fatal() {
    let (manager, store) = setup_flaky(ReadFailurePolicy::FailOpen);
    let users = EntityCache::for_entity::<User>(Arc::clone(&manager));

    store.inner.set("user:list", "[]", None).await.unwrap();
    store.fail_deletes.store(true, Ordering::SeqCst);

    let user = User::new(4);
    let report = users.saved(&user).await;

    assert!(!report.is_clean());
    assert_eq!(report.failed, 6, "every delete fails");
    assert_eq!(report.attempted, 8);

    // Detail writes still went through
    assert!(store.inner.get("user:byid:4").await.unwrap().is_some());
    assert!(store.inner.get("user:byemail:user4@example.com").await.unwrap().is_some());
    // The list entry survived the failed invalidation
    assert!(store.inner.get("user:list").await.unwrap().is_some());
    assert_eq!(manager.get_stats().write_failures, 6);
}

/// A failed detail write does not stop the list invalidation
#[tokio::test]
async fn test_failed_detail_write_still_invalidates_lists() {
    let (manager, store) = setup_flaky(ReadFailurePolicy::FailOpen);
    let users = EntityCache::for_entity::<User>(Arc::clone(&manager));

    store.inner.set("user:count", "10", None).await.unwrap();
    store.fail_sets.store(true, Ordering::SeqCst);

    let report = users.saved(&User::new(4)).await;
    assert_eq!(report.failed, 2);
    assert!(store.inner.get("user:count").await.unwrap().is_none());
}

/// A refresh still loading when the entity is deleted does not bring it back
#[tokio::test]
async fn test_refresh_in_flight_does_not_resurrect_deleted_entity() {
    let (cache, store) = setup_cache_system();
    let users = cache.entity_for::<User>();
    let manager = Arc::clone(cache.cache_manager());
    let user = User::new(5);

    assert!(users.saved(&user).await.is_clean());
    assert!(store.get("user:byid:5").await.unwrap().is_some());

    // The hit starts a refresh whose loader still returns the old row
    let old_row = user.clone();
    let hit: User = users
        .get_cached_detail("byid", &[&5], move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            anyhow::Ok(old_row)
        })
        .await
        .unwrap();
    assert_eq!(hit, user);

    assert!(users.deleted(&user).await.is_clean());
    assert!(store.get("user:byid:5").await.unwrap().is_none());

    let settled = wait_for(
        || {
            let manager = Arc::clone(&manager);
            async move {
                let stats = manager.get_stats();
                stats.refreshes_succeeded + stats.refreshes_failed == 1
            }
        },
        2000,
    )
    .await;
    assert!(settled, "refresh never finished");

    assert!(store.get("user:byid:5").await.unwrap().is_none());
    assert_eq!(manager.get_stats().discarded_loads, 1);

    // Nothing cached: the next read goes to the source, which no longer has the row
    let err = users
        .get_cached_detail::<User, _, _>("byid", &[&5], || async {
            Err(anyhow::anyhow!("user 5 not found"))
        })
        .await
        .unwrap_err();
    assert!(err.is_loader());
}

/// A direct write during a load wins over the loaded value
#[tokio::test]
async fn test_cache_detail_during_miss_load_is_kept() {
    let (cache, store) = setup_cache_without_refresh().await;
    let users = cache.entity("user");

    let loading = users.get_cached_detail::<User, _, _>("byid", &[&6], || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        anyhow::Ok(User::named(6, "before"))
    });
    let writing = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        users.cache_detail("byid", &User::named(6, "after"), &[&6]).await
    };
    let (loaded, report) = tokio::join!(loading, writing);

    // The waiter still gets the loaded value
    assert_eq!(loaded.unwrap().name, "before");
    assert!(report.is_clean());

    let stored = store.get("user:byid:6").await.unwrap().expect("entry written");
    assert_eq!(serde_json::from_str::<User>(&stored).unwrap().name, "after");
    assert_eq!(cache.cache_manager().get_stats().discarded_loads, 1);
}
