use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::Value;

use tipr::core::NumericOp;
use tipr::game::{GameKind, GameOptions};
use tipr::{apply, diff, Patch};

fn start_state() -> Value {
    let rules = GameKind::Rps.rules();
    let options = GameOptions { seed: 7, ..rules.default_options() };
    rules.start_state(&options).unwrap_or(Value::Null)
}

/// Roughly what one ability step writes.
fn resolution_patch() -> Patch {
    let mut patch = Patch::empty();
    patch.set(&["meta", "stage"], 4).unwrap();
    patch.push_numeric(&["p2", "hp"], NumericOp::Add(-6)).unwrap();
    patch.push_numeric(&["p2", "hp"], NumericOp::Mul(2)).unwrap();
    patch.list_set(&["p1", "cards"], 0, serde_json::json!({"name": "Pebble", "slot": 0, "level": 2})).unwrap();
    patch.set_serialized(&["meta", "message"], &["p1 hits for 12"]).unwrap();
    patch
}

fn bench_patch(c: &mut Criterion) {
    let state = start_state();
    let patch = resolution_patch();
    let next = apply(&state, &patch).unwrap();

    let mut group = c.benchmark_group("patch");
    group.bench_function("apply", |b| b.iter(|| apply(black_box(&state), black_box(&patch))));
    group.bench_function("diff", |b| b.iter(|| diff(black_box(&state), black_box(&next))));
    group.bench_function("merge", |b| {
        b.iter_batched(
            resolution_patch,
            |mut merged| merged.merge(resolution_patch()),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(patch_benches, bench_patch);
criterion_main!(patch_benches);
