//! # Submission Benchmark
//!
//! Cost of the commit point: merging staged entities, applying queued
//! group moves, and fanning values out to stream consumers.
//!
//! Run with: `cargo bench --package strata_core --bench submission_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use strata_core::{
    Component, ComponentId, ComponentRegistry, Egid, EntitiesDb, EntityDescriptor, EntityId,
    GroupId,
};

#[derive(Clone, Copy, Debug, Default)]
struct Position {
    x: f32,
    y: f32,
}

impl Component for Position {
    const ID: ComponentId = ComponentId(0);
    const NAME: &'static str = "Position";
}

#[derive(Clone, Copy, Debug, Default)]
struct Health(u32);

impl Component for Health {
    const ID: ComponentId = ComponentId(1);
    const NAME: &'static str = "Health";
}

const ALIVE: GroupId = GroupId(0);
const DEAD: GroupId = GroupId(1);

fn unit() -> EntityDescriptor {
    EntityDescriptor::builder("unit")
        .with::<Position>()
        .with::<Health>()
        .build()
}

fn database() -> EntitiesDb {
    let mut registry = ComponentRegistry::new();
    registry.register::<Position>().expect("unique id");
    registry.register::<Health>().expect("unique id");
    EntitiesDb::new(registry)
}

fn stage(db: &EntitiesDb, count: u32) {
    let descriptor = unit();
    for i in 0..count {
        db.factory()
            .build_entity(Egid::new(EntityId(i), ALIVE), &descriptor)
            .expect("staging");
    }
}

fn bench_merge_creations(c: &mut Criterion) {
    let mut group = c.benchmark_group("submission_merge");
    for count in [1_000_u32, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let db = database();
                    stage(&db, count);
                    db
                },
                |mut db| black_box(db.step().expect("submission")),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_group_moves(c: &mut Criterion) {
    let descriptor = unit();
    c.bench_function("submission_move_half_10k", |b| {
        b.iter_batched(
            || {
                let mut db = database();
                stage(&db, 10_000);
                db.step().expect("submission");
                for i in (0..10_000).step_by(2) {
                    db.factory()
                        .swap_entity_group(Egid::new(EntityId(i), ALIVE), DEAD, &descriptor);
                }
                db
            },
            |mut db| black_box(db.step().expect("submission")),
            BatchSize::LargeInput,
        );
    });
}

fn bench_idle_step(c: &mut Criterion) {
    let mut db = database();
    stage(&db, 10_000);
    db.step().expect("submission");
    c.bench_function("submission_idle", |b| {
        b.iter(|| black_box(db.step().expect("submission")));
    });
}

fn bench_stream_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_fan_out_1k");
    for consumers in [1_usize, 4, 16] {
        let db = database();
        let handles: Vec<_> = (0..consumers)
            .map(|i| {
                db.streams()
                    .generate_consumer::<Position>(format!("consumer-{i}"), 1_024)
                    .expect("capacity")
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(consumers), &consumers, |b, _| {
            b.iter(|| {
                for i in 0..1_000 {
                    db.streams()
                        .publish(&Position { x: 1.0, y: 2.0 }, Egid::new(EntityId(i), ALIVE))
                        .expect("room");
                }
                handles.iter().map(|consumer| consumer.flush()).sum::<usize>()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_merge_creations,
    bench_group_moves,
    bench_idle_step,
    bench_stream_fan_out
);
criterion_main!(benches);
