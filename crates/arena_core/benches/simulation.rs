//! Engine tick benchmarks for arena_core.
//!
//! Run with: `cargo bench -p arena_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use arena_core::components::Team;
use arena_core::simulation::Engine;
use arena_core::unit_kind::UnitKind;
use arena_test_utils::fixtures::{running_engine, TICK};

/// A crowded board: every kind on both sides, both lanes.
fn crowded() -> Engine {
    let mut engine = running_engine();
    for (i, kind) in UnitKind::ALL.into_iter().enumerate() {
        let offset = i as i32;
        engine.spawn_unit(kind, Team::Red, 12 + offset, 3);
        engine.spawn_unit(kind, Team::Red, 12 + offset, 14);
        engine.spawn_unit(kind, Team::Blue, 21 - offset, 3);
        engine.spawn_unit(kind, Team::Blue, 21 - offset, 14);
    }
    engine
}

pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("tick_empty_board", |b| {
        let mut engine = running_engine();
        let mut tick = 0;
        b.iter(|| {
            tick += 1;
            black_box(engine.update(TICK, tick))
        });
    });

    c.bench_function("tick_crowded_board", |b| {
        b.iter_batched(
            crowded,
            |mut engine| {
                for tick in 1..=10 {
                    black_box(engine.update(TICK, tick));
                }
                engine
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("snapshot_crowded_board", |b| {
        let mut engine = crowded();
        engine.update(Duration::from_secs(2), 1);
        b.iter(|| black_box(engine.snapshot(0)));
    });
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
