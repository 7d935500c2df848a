//! Benchmarks for cache stampede protection

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use entity_cache::{CacheSystem, DashMapCache, EntityCache};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn setup_cache() -> (EntityCache, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"));
    let cache = CacheSystem::with_store(Arc::new(DashMapCache::new()));
    (cache.entity("bench"), rt)
}

/// Benchmark 100 concurrent misses on one key
fn bench_stampede_protection(c: &mut Criterion) {
    let (cache, rt) = setup_cache();

    c.bench_function("stampede_100_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let id = rand::random::<u32>();
                let mut handles = vec![];

                for _ in 0..100 {
                    let cache = cache.clone();
                    let handle = tokio::spawn(async move {
                        cache
                            .get_cached_detail("stampede", &[&id], || async {
                                tokio::time::sleep(Duration::from_millis(10)).await;
                                anyhow::Ok(json!({"computed": true}))
                            })
                            .await
                            .unwrap_or_else(|_| panic!("Failed to compute"))
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    black_box(handle.await.unwrap_or_else(|_| panic!("Task failed")));
                }
            });
        });
    });
}

/// Benchmark the hit path, background refresh included
fn bench_cache_hit(c: &mut Criterion) {
    let (cache, rt) = setup_cache();
    rt.block_on(async {
        cache.cache_detail("hit", &json!({"id": 1}), &[&1]).await;
    });

    c.bench_function("cache_hit_with_refresh", |b| {
        b.iter(|| {
            rt.block_on(async {
                let value: serde_json::Value = cache
                    .get_cached_detail("hit", &[&1], || async { anyhow::Ok(json!({"id": 1})) })
                    .await
                    .unwrap_or_else(|_| panic!("Failed to read"));
                black_box(value);
            });
        });
    });
}

/// Benchmark invalidating a list operation over a populated namespace
fn bench_invalidate_operation(c: &mut Criterion) {
    let (cache, rt) = setup_cache();
    rt.block_on(async {
        for page in 0..100 {
            cache.cache_detail("list", &json!([page]), &[&page]).await;
        }
    });

    c.bench_function("invalidate_operation_100_keys", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(cache.invalidate_cache(&["list"]).await);
            });
        });
    });
}

criterion_group!(benches, bench_stampede_protection, bench_cache_hit, bench_invalidate_operation);
criterion_main!(benches);
