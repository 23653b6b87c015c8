//! Store Throughput Benchmark for EmberMark
//!
//! Measures the hot paths: mark insertion, active-range queries, and
//! expiry batch removal.

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use embermark::model::{Mark, MarkColor, MARK_TTL_SECONDS};
use embermark::store::{MarkStore, ACTIVE_QUERY_LIMIT};
use std::sync::Arc;

fn fresh_mark() -> Mark {
    Mark::new(49.0, 28.0, MarkColor::Blue, None, Utc::now())
}

/// Benchmark PUT operations
fn bench_put(c: &mut Criterion) {
    let store = Arc::new(MarkStore::new());

    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put", |b| {
        b.iter(|| {
            store.put(fresh_mark());
        });
    });

    group.finish();
}

/// Benchmark active-range queries against a populated store
fn bench_get_active(c: &mut Criterion) {
    let store = Arc::new(MarkStore::new());

    // Pre-populate with live marks
    for _ in 0..10_000 {
        store.put(fresh_mark());
    }

    let mut group = c.benchmark_group("get_active");
    group.throughput(Throughput::Elements(1));

    group.bench_function("snapshot_capped", |b| {
        b.iter(|| {
            black_box(store.get_active(Utc::now(), ACTIVE_QUERY_LIMIT));
        });
    });

    group.bench_function("snapshot_small", |b| {
        b.iter(|| {
            black_box(store.get_active(Utc::now(), 100));
        });
    });

    group.finish();
}

/// Benchmark expiry batch removal, the sweeper's inner loop
fn bench_take_expired(c: &mut Criterion) {
    let mut group = c.benchmark_group("take_expired");

    group.bench_function("batch_of_1000", |b| {
        b.iter_batched(
            || {
                let store = MarkStore::new();
                let created = Utc::now() - Duration::seconds(MARK_TTL_SECONDS + 60);
                for _ in 0..1000 {
                    store.put(Mark::new(49.0, 28.0, MarkColor::Green, None, created));
                }
                store
            },
            |store| {
                black_box(store.take_expired(Utc::now(), 1000));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark concurrent puts from multiple threads
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("4_threads_put", |b| {
        b.iter(|| {
            let store = Arc::new(MarkStore::new());
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for _ in 0..2_500 {
                            store.put(fresh_mark());
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_get_active,
    bench_take_expired,
    bench_concurrent,
);

criterion_main!(benches);
