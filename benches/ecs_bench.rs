#![allow(dead_code)]
//! Benchmarks for the core world operations
//!
//! Run with: cargo bench
//!
//! - Entity creation with components (archetype refiling)
//! - Exact-set vs superset archetype queries
//! - Query builder pipelines
//! - Level computation and parallel update

use atom_ecs::{Result, System, World};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

#[derive(Debug, Copy, Clone)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone)]
struct Health(u32);

fn populate(world: &World, count: usize) {
    for i in 0..count {
        let entity = world.create_entity();
        let _ = world.add_component(
            entity,
            Position {
                x: i as f32,
                y: 0.0,
                z: 0.0,
            },
        );
        if i % 2 == 0 {
            let _ = world.add_component(
                entity,
                Velocity {
                    x: 1.0,
                    y: 0.0,
                    z: 0.0,
                },
            );
        }
        if i % 3 == 0 {
            let _ = world.add_component(entity, Health(100));
        }
    }
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");
    for count in [100, 1_000] {
        group.bench_with_input(BenchmarkId::new("create_with_components", count), &count, |b, &count| {
            b.iter(|| {
                let world = World::new();
                populate(&world, count);
                black_box(world.entity_count())
            });
        });
    }
    group.finish();
}

fn bench_archetype_queries(c: &mut Criterion) {
    let world = World::new();
    populate(&world, 10_000);

    let mut group = c.benchmark_group("archetype_query");
    group.bench_function("exact_set", |b| {
        b.iter(|| black_box(world.entities_with::<(Position, Velocity)>().map(|e| e.len())));
    });
    group.bench_function("superset", |b| {
        b.iter(|| black_box(world.entities_having::<(Position,)>().len()));
    });
    group.finish();
}

fn bench_query_builder(c: &mut Criterion) {
    let world = World::new();
    populate(&world, 10_000);

    c.bench_function("query_with_without_order_limit", |b| {
        b.iter(|| {
            let top = world
                .query()
                .with::<Position>()
                .without::<Health>()
                .order_by_descending(|entity| {
                    world
                        .read_component::<Position>(entity)
                        .map_or(0.0, |pos| pos.x)
                })
                .limit(10)
                .build();
            black_box(top)
        });
    });
}

struct Movement;

impl System for Movement {
    fn update(&mut self, world: &World, delta_time: f32) -> Result<()> {
        for entity in world.entities_with::<(Position, Velocity)>()? {
            let vel = *world.read_component::<Velocity>(entity)?;
            let mut pos = world.get_component::<Position>(entity)?;
            pos.x += vel.x * delta_time;
        }
        Ok(())
    }
}

struct Regen;

impl System for Regen {
    fn update(&mut self, world: &World, _delta_time: f32) -> Result<()> {
        for entity in world.entities_having::<(Health,)>() {
            world.get_component::<Health>(entity)?.0 += 1;
        }
        Ok(())
    }
}

fn bench_update(c: &mut Criterion) {
    let world = World::new();
    populate(&world, 10_000);
    world.add_system(Movement);
    world.add_system(Regen);

    let mut group = c.benchmark_group("update");
    group.bench_function("parallel_levels", |b| {
        b.iter(|| world.update(black_box(0.016)));
    });
    group.bench_function("single_thread", |b| {
        b.iter(|| world.update_single_thread(black_box(0.016)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_create,
    bench_archetype_queries,
    bench_query_builder,
    bench_update
);
criterion_main!(benches);
