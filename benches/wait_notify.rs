//! Costs of the paths that should never reach the OS: uncontended locking,
//! plain loads and stores, and notifies nobody is waiting for.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::thread;
use waitable_atomics::locks::Mutex;
use waitable_atomics::{Atomic, MemoryOrder::*};

fn bench_uncontended_mutex(c: &mut Criterion) {
    let m = Mutex::new(0u64);
    c.bench_function("mutex_uncontended", |b| {
        b.iter(|| {
            *m.lock() += 1;
        });
    });
    black_box(m.into_inner());
}

fn bench_contended_mutex(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex_contended");
    group.sample_size(10);

    for threads in [2, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let m = Mutex::new(0u64);
                thread::scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|| {
                            for _ in 0..10_000 {
                                *m.lock() += 1;
                            }
                        });
                    }
                });
                black_box(m.into_inner())
            });
        });
    }

    group.finish();
}

fn bench_load_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_store");

    let word = Atomic::new(0u64);
    group.bench_function("u64", |b| {
        b.iter(|| {
            let v = word.load(Acquire);
            word.store(black_box(v + 1), Release);
        });
    });

    let wide = Atomic::new([0u64; 2]);
    group.bench_function("sixteen_bytes", |b| {
        b.iter(|| {
            let v = wide.load(Acquire);
            wide.store(black_box([v[0] + 1, v[1]]), Release);
        });
    });

    let spilled = Atomic::new([0u64; 4]);
    group.bench_function("spilled", |b| {
        b.iter(|| {
            let v = spilled.load(Acquire);
            spilled.store(black_box([v[0] + 1, v[1], v[2], v[3]]), Release);
        });
    });

    group.finish();
}

fn bench_notify_without_waiters(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_without_waiters");

    let direct = Atomic::new(0u32);
    group.bench_function("direct", |b| b.iter(|| black_box(&direct).notify_one()));

    let indirect = Atomic::new([0u64; 4]);
    group.bench_function("indirect", |b| b.iter(|| black_box(&indirect).notify_all()));

    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended_mutex,
    bench_contended_mutex,
    bench_load_store,
    bench_notify_without_waiters,
);
criterion_main!(benches);
