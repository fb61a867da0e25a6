//! End-to-end simulation scenarios: resting contact, elastic collision,
//! stacking, ray queries, sleeping and a pendulum joint.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use rigid_dynamics::{
    BodyId, DynamicsWorld, JointDesc, Material, Shape, Transform, WorldConfig,
};

const DT: f64 = 1.0 / 60.0;

fn world_with(config: WorldConfig) -> DynamicsWorld {
    DynamicsWorld::new(config).expect("valid configuration")
}

fn add_floor(world: &mut DynamicsWorld) -> BodyId {
    world
        .create_static_body(
            Transform::identity(),
            Shape::box_shape(Vector3::new(10.0, 0.5, 10.0)),
        )
        .expect("floor")
}

fn add_box(world: &mut DynamicsWorld, position: Point3<f64>, mass: f64) -> BodyId {
    let shape = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
    world
        .create_body(
            Transform::from_position(position),
            mass,
            shape.local_inertia(mass),
            shape,
        )
        .expect("box")
}

fn add_sphere(world: &mut DynamicsWorld, position: Point3<f64>, radius: f64, mass: f64) -> BodyId {
    let shape = Shape::sphere(radius);
    world
        .create_body(
            Transform::from_position(position),
            mass,
            shape.local_inertia(mass),
            shape,
        )
        .expect("sphere")
}

fn run(world: &mut DynamicsWorld, seconds: f64) {
    let steps = (seconds / DT).round() as usize;
    for _ in 0..steps {
        world.update();
    }
}

/// A unit box dropped from 5 m settles on the floor.
///
/// The floor's top face is at y = 0.5 and the box rests with its collision
/// margin on the floor's, so the center settles slightly above 1.0.
#[test]
fn box_dropped_on_floor_comes_to_rest() {
    let mut world = world_with(WorldConfig::default());
    add_floor(&mut world);
    let falling = add_box(&mut world, Point3::new(0.0, 5.0, 0.0), 5.0);

    world.start();
    run(&mut world, 2.0);

    let body = world.body(falling).unwrap();
    let y = body.transform().position.y;
    assert!((0.95..=1.15).contains(&y), "resting height, got {y}");
    assert!(
        body.linear_velocity().norm() < 0.05,
        "box is at rest, |v| = {}",
        body.linear_velocity().norm()
    );
    assert!((body.transform().orientation.norm() - 1.0).abs() < 1e-5);
}

/// Two equal spheres in a head-on, perfectly elastic collision swap
/// velocities; kinetic energy is conserved.
#[test]
fn elastic_head_on_spheres_swap_velocities() {
    let config = WorldConfig::default().zero_gravity().without_sleeping();
    let mut world = world_with(config);

    let left = add_sphere(&mut world, Point3::new(-2.0, 0.0, 0.0), 0.5, 1.0);
    let right = add_sphere(&mut world, Point3::new(2.0, 0.0, 0.0), 0.5, 1.0);
    for body in [left, right] {
        world.set_material(body, Material::new(1.0, 0.0)).unwrap();
    }
    world
        .set_linear_velocity(left, Vector3::new(1.0, 0.0, 0.0))
        .unwrap();
    world
        .set_linear_velocity(right, Vector3::new(-1.0, 0.0, 0.0))
        .unwrap();

    let energy_before = world.total_kinetic_energy();

    world.start();
    run(&mut world, 100.0 * DT + 1.5);

    let v_left = world.body(left).unwrap().linear_velocity();
    let v_right = world.body(right).unwrap().linear_velocity();
    assert_relative_eq!(v_left.x, -1.0, epsilon = 0.05);
    assert_relative_eq!(v_right.x, 1.0, epsilon = 0.05);
    assert!(v_left.y.abs() < 0.05 && v_left.z.abs() < 0.05);

    let energy_after = world.total_kinetic_energy();
    let drift = (energy_after - energy_before).abs() / energy_before;
    assert!(drift <= 0.01, "kinetic energy drift {drift}");
}

/// Five stacked unit boxes stay settled for three seconds.
#[test]
fn stack_of_boxes_stays_settled() {
    let mut world = world_with(WorldConfig::default().without_sleeping());
    add_floor(&mut world);

    // Resting spacing includes the collision margins between the declared
    // faces
    let spacing = 1.078;
    let boxes: Vec<BodyId> = (1..=5)
        .map(|level| {
            add_box(
                &mut world,
                Point3::new(0.0, f64::from(level) * spacing, 0.0),
                1.0,
            )
        })
        .collect();
    let initial: Vec<f64> = boxes
        .iter()
        .map(|&id| world.body(id).unwrap().transform().position.y)
        .collect();

    world.start();
    run(&mut world, 3.0);

    for (index, &id) in boxes.iter().enumerate() {
        let body = world.body(id).unwrap();
        let y = body.transform().position.y;
        assert!(
            (y - initial[index]).abs() < 0.1,
            "box {index} drifted from {} to {y}",
            initial[index]
        );
        assert!(
            body.linear_velocity().norm() < 0.05,
            "box {index} still moving at {}",
            body.linear_velocity().norm()
        );
        assert!((body.transform().orientation.norm() - 1.0).abs() < 1e-5);
    }
}

/// A downward ray over the settled box scene reports the box first and the
/// floor last, with hit points on the expected faces.
#[test]
fn ray_cast_reports_box_then_floor() {
    let mut world = world_with(WorldConfig::default());
    let floor = add_floor(&mut world);
    let falling = add_box(&mut world, Point3::new(0.0, 5.0, 0.0), 5.0);

    world.start();
    run(&mut world, 2.0);

    let closest = world
        .find_closest_intersecting_body(Point3::new(0.0, 10.0, 0.0), Vector3::new(0.0, -1.0, 0.0))
        .unwrap()
        .expect("ray hits the scene");
    let furthest = world
        .find_furthest_intersecting_body(Point3::new(0.0, 10.0, 0.0), Vector3::new(0.0, -1.0, 0.0))
        .unwrap()
        .expect("ray hits the scene");

    assert_eq!(closest.body, falling, "the box is nearer the ray origin");
    assert_eq!(furthest.body, floor);

    // The box's top face sits half an extent above its settled center; the
    // floor's nearest intersection is its top face at y = 0.5
    let box_top = world.body(falling).unwrap().transform().position.y + 0.5;
    assert_relative_eq!(closest.point.y, box_top, epsilon = 1e-6);
    assert_relative_eq!(furthest.point.y, 0.5, epsilon = 1e-6);
}

/// A body at rest falls asleep and an external force wakes it again.
#[test]
fn resting_body_sleeps_and_force_wakes_it() {
    let mut world = world_with(WorldConfig::default());
    add_floor(&mut world);
    let ball = add_sphere(&mut world, Point3::new(0.0, 1.2, 0.0), 0.5, 5.0);

    world.start();
    run(&mut world, 5.0);

    {
        let body = world.body(ball).unwrap();
        assert!(body.is_sleeping(), "ball sleeps after five quiet seconds");
        assert_eq!(body.linear_velocity(), Vector3::zeros());
        assert_eq!(body.angular_velocity(), Vector3::zeros());
        assert_eq!(body.force(), Vector3::zeros());
        assert_eq!(body.torque(), Vector3::zeros());
    }

    world
        .apply_force_to_center(ball, Vector3::new(0.0, 50.0, 0.0))
        .unwrap();
    assert!(
        !world.body(ball).unwrap().is_sleeping(),
        "a force wakes the body"
    );

    // The force lifts the ball on the next step
    world.update();
    assert!(world.body(ball).unwrap().linear_velocity().y > 0.0);
}

/// A box at rest stays at rest through a thousand steps.
#[test]
fn rest_contact_is_stable_over_long_runs() {
    let mut world = world_with(WorldConfig::default().without_sleeping());
    add_floor(&mut world);
    // Placed in the resting band so no settling transient is needed
    let resting = add_box(&mut world, Point3::new(0.0, 1.078, 0.0), 5.0);

    world.start();
    // Allow a short transient while the contact manifold fills in
    run(&mut world, 120.0 * DT);

    for _ in 0..1000 {
        world.update();
        let body = world.body(resting).unwrap();
        assert!(
            body.linear_velocity().norm() < 0.05,
            "box moved, |v| = {}",
            body.linear_velocity().norm()
        );
    }
    let y = world.body(resting).unwrap().transform().position.y;
    assert!((0.95..=1.15).contains(&y), "box stayed put, y = {y}");
}

/// A ball-socket pendulum swings with the small-angle period 2π√(L/g).
#[test]
fn pendulum_period_matches_theory() {
    let config = WorldConfig::default().without_sleeping();
    let mut world = world_with(config);

    let anchor = world
        .create_static_body(Transform::identity(), Shape::sphere(0.05))
        .unwrap();
    let _ = anchor;

    // Small initial angle: x = L sin θ, y = -L cos θ with θ = 0.1 rad
    let length = 1.0;
    let theta = 0.1_f64;
    let bob = add_sphere(
        &mut world,
        Point3::new(length * theta.sin(), -length * theta.cos(), 0.0),
        0.05,
        1.0,
    );

    world
        .create_joint(JointDesc::BallSocket {
            body_a: anchor,
            body_b: bob,
            anchor: Point3::origin(),
        })
        .unwrap();

    world.start();

    // Track sign changes of x over ten seconds to estimate the period
    let mut crossing_times = Vec::new();
    let mut previous_x = world.body(bob).unwrap().transform().position.x;
    let steps = (10.0 / DT) as usize;
    for step in 0..steps {
        world.update();
        let x = world.body(bob).unwrap().transform().position.x;
        if previous_x > 0.0 && x <= 0.0 || previous_x < 0.0 && x >= 0.0 {
            crossing_times.push(step as f64 * DT);
        }
        previous_x = x;
    }

    assert!(
        crossing_times.len() >= 4,
        "pendulum must keep swinging, got {} crossings",
        crossing_times.len()
    );
    // Two crossings per period
    let first = crossing_times[0];
    let last = crossing_times[crossing_times.len() - 1];
    let measured = 2.0 * (last - first) / (crossing_times.len() - 1) as f64;

    let expected = 2.0 * std::f64::consts::PI * (length / 9.81).sqrt();
    let error = (measured - expected).abs() / expected;
    assert!(
        error < 0.1,
        "period {measured} s vs theoretical {expected} s (error {error})"
    );

    // The joint keeps the bob on its circle
    let position = world.body(bob).unwrap().transform().position;
    assert_relative_eq!(position.coords.norm(), length, epsilon = 0.05);
}

/// Contact bookkeeping invariants hold while a pile forms.
#[test]
fn manifolds_stay_within_bounds_and_normals_unit() {
    let mut world = world_with(WorldConfig::default());
    add_floor(&mut world);
    for index in 0..4 {
        add_box(
            &mut world,
            Point3::new(
                f64::from(index % 2) * 0.6 - 0.3,
                1.5 + f64::from(index) * 1.2,
                0.0,
            ),
            2.0,
        );
    }

    world.start();
    for _ in 0..240 {
        world.update();
        for (_, manifold) in world.manifolds().iter() {
            assert!(manifold.points().len() <= 4);
            for point in manifold.points() {
                assert_relative_eq!(point.normal.norm(), 1.0, epsilon = 1e-6);
                assert!(point.penetration >= -0.031, "stale points are pruned");
            }
        }
    }
}
