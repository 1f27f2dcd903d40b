//! Micro-operation benchmarks for the tiered cache.
//!
//! Run with: `cargo bench --bench ops`
//!
//! Measures per-operation latency for get and set under identical
//! conditions, plus the mixed read-heavy pattern the cache is built for.

use std::hint::black_box;
use std::time::Instant;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tiercache::prelude::*;

const CAPACITY: usize = 16_384;
const OPS: u64 = 100_000;

fn populated_cache() -> TierCache<u64, u64> {
    let cache = TierCache::new(Config {
        mfu_size: CAPACITY / 4,
        mru_size: CAPACITY,
        shard_count: 16,
        ..Config::default()
    })
    .unwrap();
    for i in 0..CAPACITY as u64 {
        cache.set(i, i);
    }
    cache
}

// ============================================================================
// Get Hit Latency (ns/op)
// ============================================================================

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit_ns");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("tiercache", |b| {
        b.iter_custom(|iters| {
            let cache = populated_cache();
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    black_box(cache.get(&key));
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Set Latency (ns/op)
// ============================================================================

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_ns");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("tiercache_update", |b| {
        b.iter_custom(|iters| {
            let cache = populated_cache();
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    black_box(cache.set(key, i));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("tiercache_insert_evict", |b| {
        b.iter_custom(|iters| {
            let cache = populated_cache();
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    // Always-new keys keep the inline eviction path hot.
                    black_box(cache.set(CAPACITY as u64 + i, i));
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Read-Heavy Mix (ops/s)
// ============================================================================

fn bench_read_heavy_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_heavy_mix");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("get90_set10", |b| {
        b.iter_custom(|iters| {
            let cache = populated_cache();
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    if i % 10 == 0 {
                        black_box(cache.set(key, i));
                    } else {
                        black_box(cache.get(&key));
                    }
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_get_hit, bench_set, bench_read_heavy_mix);
criterion_main!(benches);
