//! Dynamics world for the rigid-body physics engine.
//!
//! This crate is the orchestrator on top of [`rigid_collision`] and
//! [`rigid_constraint`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DynamicsWorld                           │
//! │  Body lifecycle, fixed-step pipeline, sleeping, ray queries  │
//! └───────────┬───────────────────────┬─────────────────────────┘
//!             │                       │
//!             ▼                       ▼
//! ┌───────────────────────┐ ┌────────────────────────────────────┐
//! │    rigid-collision    │ │          rigid-constraint          │
//! │ SAP, GJK/EPA,         │ │ islands, joints, sequential        │
//! │ persistent manifolds  │ │ impulses (PGS)                     │
//! └───────────────────────┘ └────────────────────────────────────┘
//! ```
//!
//! Every [`DynamicsWorld::update`] advances the simulation by one fixed
//! timestep through the stages in order: force integration, AABB refresh,
//! broad phase, narrow phase, manifold update, island construction,
//! constraint solving, position integration, sleep bookkeeping. The engine
//! is single-threaded and cooperative: exactly one caller drives `update`,
//! and a step is atomic.
//!
//! # Quick Start
//!
//! ```
//! use rigid_dynamics::DynamicsWorld;
//! use rigid_collision::Shape;
//! use rigid_types::{Transform, WorldConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = DynamicsWorld::new(WorldConfig::default()).unwrap();
//!
//! // A static floor and a box dropped onto it
//! world
//!     .create_static_body(
//!         Transform::identity(),
//!         Shape::box_shape(Vector3::new(10.0, 0.5, 10.0)),
//!     )
//!     .unwrap();
//! let shape = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
//! let falling = world
//!     .create_body(
//!         Transform::from_position(Point3::new(0.0, 5.0, 0.0)),
//!         5.0,
//!         shape.local_inertia(5.0),
//!         shape,
//!     )
//!     .unwrap();
//!
//! world.start();
//! for _ in 0..120 {
//!     world.update();
//! }
//!
//! // The box has fallen toward the floor
//! assert!(world.body(falling).unwrap().transform().position.y < 5.0);
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-dynamics/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod links;
mod raycast;
mod world;

pub use body::RigidBody;
pub use raycast::{Ray, RayHit};
pub use world::DynamicsWorld;

// Re-export the layers below for convenience
pub use rigid_collision::{Aabb, ContactManifold, Shape, ShapeHandle};
pub use rigid_constraint::{Joint, JointDesc};
pub use rigid_types::{
    BodyId, ErrorKind, JointId, Material, PhysicsError, Result, Transform, Velocity, WorldConfig,
};
