//! Benchmarks for the world step pipeline.
//!
//! Run with: cargo bench -p rigid-dynamics

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::{Point3, Vector3};
use rigid_dynamics::{DynamicsWorld, Shape, Transform, WorldConfig};

/// A grid of spheres falling onto a static floor.
fn build_rain_world(count: usize) -> DynamicsWorld {
    let mut world = DynamicsWorld::new(WorldConfig::default().without_sleeping()).unwrap();
    world
        .create_static_body(
            Transform::identity(),
            Shape::box_shape(Vector3::new(50.0, 0.5, 50.0)),
        )
        .unwrap();

    let shape = Shape::sphere(0.4);
    let side = (count as f64).cbrt().ceil() as usize;
    let mut placed = 0;
    'outer: for x in 0..side {
        for y in 0..side {
            for z in 0..side {
                if placed >= count {
                    break 'outer;
                }
                world
                    .create_body(
                        Transform::from_position(Point3::new(
                            x as f64 * 1.1 - side as f64 * 0.55,
                            2.0 + y as f64 * 1.1,
                            z as f64 * 1.1 - side as f64 * 0.55,
                        )),
                        1.0,
                        shape.local_inertia(1.0),
                        shape,
                    )
                    .unwrap();
                placed += 1;
            }
        }
    }
    world.start();
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[16usize, 64, 256] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("sphere_rain", count), &count, |b, &n| {
            let mut world = build_rain_world(n);
            // Let the pile form so the solver has real work
            for _ in 0..60 {
                world.update();
            }
            b.iter(|| world.update());
        });
    }
    group.finish();
}

fn bench_settled_scene(c: &mut Criterion) {
    c.bench_function("settled_scene_step", |b| {
        let mut world = build_rain_world(64);
        for _ in 0..600 {
            world.update();
        }
        b.iter(|| world.update());
    });
}

criterion_group!(benches, bench_world_step, bench_settled_scene);
criterion_main!(benches);
