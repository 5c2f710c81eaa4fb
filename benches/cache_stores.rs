//! Benchmarks for cache store and call cache performance
//!
//! This benchmark measures:
//! - get/set throughput per eviction policy
//! - Key generation with and without hashing
//! - Memoized call overhead on a warm chain

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use skill_cache::{CacheStore, CallCache, CallIdentity, KeyGenerator, LocalCache};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const ENTRIES: usize = 1_000;

fn keys() -> Vec<Vec<u8>> {
    (0..ENTRIES).map(|n| format!("skill_key_{}", n).into_bytes()).collect()
}

fn stores() -> Vec<(&'static str, LocalCache<u64>)> {
    vec![
        ("unconditional", LocalCache::unconditional()),
        ("fifo", LocalCache::fifo(ENTRIES / 2)),
        ("lru", LocalCache::lru(ENTRIES / 2)),
        ("timeout", LocalCache::timeout(Duration::from_secs(3600))),
    ]
}

fn bench_store_set(c: &mut Criterion) {
    let keys = keys();
    let mut group = c.benchmark_group("store_set");
    group.throughput(Throughput::Elements(ENTRIES as u64));

    for (name, store) in stores() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &store, |b, store| {
            b.iter(|| {
                for (n, key) in keys.iter().enumerate() {
                    store.set(key.clone(), n as u64);
                }
            })
        });
    }
    group.finish();
}

fn bench_store_get(c: &mut Criterion) {
    let keys = keys();
    let mut group = c.benchmark_group("store_get");
    group.throughput(Throughput::Elements(ENTRIES as u64));

    for (name, store) in stores() {
        for (n, key) in keys.iter().enumerate() {
            store.set(key.clone(), n as u64);
        }
        group.bench_with_input(BenchmarkId::from_parameter(name), &store, |b, store| {
            b.iter(|| {
                for key in &keys {
                    let _ = black_box(store.get(key));
                }
            })
        });
    }
    group.finish();
}

fn bench_key_generation(c: &mut Criterion) {
    let identity = CallIdentity::new("weather::forecast").with_type("WeatherService");
    let mut kwargs = BTreeMap::new();
    kwargs.insert("units", "metric");
    kwargs.insert("language", "de");

    let mut group = c.benchmark_group("key_generation");
    for hashing in [true, false] {
        let generator = KeyGenerator::new("skill-weather").with_hashing(hashing);
        group.bench_with_input(BenchmarkId::new("hashing", hashing), &generator, |b, generator| {
            b.iter(|| generator.generate(black_box(&identity), &("Berlin", 3), &kwargs))
        });
    }
    group.finish();
}

fn bench_memoized_call(c: &mut Criterion) {
    let chain: Vec<Arc<dyn CacheStore<String>>> = vec![
        Arc::new(LocalCache::lru(100)),
        Arc::new(LocalCache::timeout(Duration::from_secs(3600))),
    ];
    let cache = CallCache::new(chain, false).expect("non-empty chain");
    let identity = CallIdentity::new("geocode");

    c.bench_function("memoized_call_warm", |b| {
        b.iter(|| {
            cache
                .call(&identity, black_box(&("Berlin",)), || "52.52,13.40".to_string())
                .expect("serializable arguments")
        })
    });
}

criterion_group!(
    benches,
    bench_store_set,
    bench_store_get,
    bench_key_generation,
    bench_memoized_call
);
criterion_main!(benches);
