//! Collision detection for the rigid-body physics engine.
//!
//! This crate covers the full detection stack between the body store and
//! the constraint solver:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SweepAndPrune (broad phase)                 │
//! │  Sorted endpoint lists per axis; bubble swaps on AABB moves  │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ axis-overlap transitions
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PairManager                            │
//! │  Pair is active once all three axes overlap; emits events    │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ active pairs
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Narrow phase (GJK + EPA, spheres analytic)      │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ fresh contact points
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ContactManifold / ManifoldStore                 │
//! │  Up to 4 persistent points per pair; warm-start impulses     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rigid_collision::{collide, Shape};
//! use rigid_types::Transform;
//! use nalgebra::Point3;
//!
//! let sphere = Shape::sphere(0.5);
//! let a = Transform::from_position(Point3::new(0.0, 0.0, 0.0));
//! let b = Transform::from_position(Point3::new(0.8, 0.0, 0.0));
//!
//! let contact = collide(&sphere, &a, &sphere, &b).expect("spheres overlap");
//! assert!(contact.penetration > 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-collision/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod aabb;
pub mod gjk_epa;
mod manifold;
mod narrow;
mod pair;
mod shape;
mod sweep_prune;

pub use aabb::Aabb;
pub use gjk_epa::GjkEpaContact;
pub use manifold::{
    ContactManifold, ContactPoint, ManifoldStore, MAX_CONTACT_POINTS, PERSISTENCE_THRESHOLD,
};
pub use narrow::{collide, ContactPointInfo};
pub use pair::{OverlappingPair, PairEvent, PairKey, PairManager};
pub use shape::{Shape, ShapeHandle, ShapeRegistry, COLLISION_MARGIN};
pub use sweep_prune::SweepAndPrune;
