//! Benchmarks for ripple-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::reactive::{observe, watch, Computed, Value, WatchOptions};
use ripple_core::tick;
use serde_json::json;

fn state(json: serde_json::Value) -> Value {
    let value = Value::from(json);
    observe(&value);
    value
}

fn bench_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe");
    for width in [10usize, 100, 1000] {
        let fields: serde_json::Map<String, serde_json::Value> =
            (0..width).map(|i| (format!("f{i}"), json!({ "v": i }))).collect();
        group.bench_with_input(BenchmarkId::from_parameter(width), &fields, |b, fields| {
            b.iter(|| {
                let value = Value::from(serde_json::Value::Object(fields.clone()));
                black_box(observe(&value))
            })
        });
    }
    group.finish();
}

fn bench_tracked_read(c: &mut Criterion) {
    let data = state(json!({ "a": 1 }));
    let sum = Computed::new(&data, |ctx| Ok(ctx.get("a")));
    let object = data.as_object().cloned().unwrap_or_default();
    c.bench_function("computed_recompute", |b| {
        let mut n = 0;
        b.iter(|| {
            n += 1;
            object.set("a", n);
            black_box(sum.get())
        })
    });
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    for watchers in [1usize, 10, 100] {
        let data = state(json!({ "a": 0 }));
        let handles: Vec<_> = (0..watchers)
            .map(|_| watch(&data, "a", |_, _| Ok(()), WatchOptions::default()).unwrap())
            .collect();
        let object = data.as_object().cloned().unwrap_or_default();

        group.bench_with_input(BenchmarkId::from_parameter(watchers), &watchers, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                object.set("a", n);
                tick::run_until_idle()
            })
        });
        drop(handles);
    }
    group.finish();
}

criterion_group!(benches, bench_observe, bench_tracked_read, bench_flush);
criterion_main!(benches);
