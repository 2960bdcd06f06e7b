//! Benchmarks for trellis-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use trellis_core::patch::{self, PatchOp};
use trellis_core::reactive::{autorun, Computed, Observable, Runtime};
use trellis_core::store::Store;

// =============================================================================
// OBSERVABLE BENCHMARKS
// =============================================================================

fn bench_observable_set(c: &mut Criterion) {
    let runtime = Runtime::new();
    let cell = Observable::new(&runtime, 0i32);
    c.bench_function("observable_set", |b| b.iter(|| cell.set(black_box(42))));
}

fn bench_observable_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("observable_notify");
    for subscribers in [1usize, 10, 100] {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, 0i32);
        let watchers: Vec<_> = (0..subscribers)
            .map(|_| {
                let reader = cell.clone();
                autorun(&runtime, move || {
                    black_box(reader.get());
                })
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            b.iter(|| cell.set(black_box(1)))
        });
        drop(watchers);
    }
    group.finish();
}

// =============================================================================
// TRANSACTION BENCHMARKS
// =============================================================================

fn bench_transaction_coalescing(c: &mut Criterion) {
    let runtime = Runtime::new();
    let cell = Observable::new(&runtime, 0i32);
    let reader = cell.clone();
    let doubled = Computed::new(&runtime, move || reader.get().unwrap_or_default() * 2);
    let watched = doubled.clone();
    let _watch = autorun(&runtime, move || {
        black_box(watched.get());
    });

    c.bench_function("transaction_100_writes", |b| {
        b.iter(|| {
            runtime.transaction(|| {
                for i in 0..100 {
                    cell.set(black_box(i));
                }
            })
        })
    });
}

// =============================================================================
// PATCH BENCHMARKS
// =============================================================================

fn bench_patch_apply(c: &mut Criterion) {
    let ops = vec![
        PatchOp::add(["a", "b", "c"], 1),
        PatchOp::replace(["a", "b", "c"], 2),
        PatchOp::copy_from(["a", "b", "c"], ["a", "d"]),
        PatchOp::move_from(["a", "d"], ["e"]),
        PatchOp::test(["e"], 2),
        PatchOp::remove(["e"]),
    ];
    c.bench_function("patch_apply_value", |b| {
        b.iter(|| {
            let mut doc = json!({"a": {"b": {}}});
            black_box(patch::apply(&mut doc, &ops))
        })
    });
}

fn bench_store_set(c: &mut Criterion) {
    let runtime = Runtime::new();
    let store = Store::from_value(&runtime, json!({"count": 0, "nested": {"items": []}})).unwrap();
    let mut n = 0i64;
    c.bench_function("store_set_with_diff", |b| {
        b.iter(|| {
            n += 1;
            store.set("count", black_box(n)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_observable_set,
    bench_observable_notify,
    bench_transaction_coalescing,
    bench_patch_apply,
    bench_store_set,
);
criterion_main!(benches);
