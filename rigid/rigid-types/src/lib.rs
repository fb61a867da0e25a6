//! Core types for the rigid-body physics engine.
//!
//! This crate provides the foundational types shared by every layer of the
//! engine:
//!
//! - [`Transform`] - Position and orientation of a body
//! - [`Velocity`] - Linear and angular velocity
//! - [`Material`] - Surface properties (restitution, friction)
//! - [`WorldConfig`] - Timestep, gravity, solver and sleep settings
//! - [`PhysicsError`] - Unified error type for fallible operations
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no simulation behavior, no
//! collision detection, no integration. They're the common language between:
//!
//! - Collision detection (rigid-collision)
//! - Constraint solving (rigid-constraint)
//! - The dynamics world (rigid-dynamics)
//! - User code reading transforms for rendering
//!
//! # Example
//!
//! ```
//! use rigid_types::{Transform, Velocity};
//! use nalgebra::{Point3, Vector3};
//!
//! // A body two meters up, drifting along +X
//! let transform = Transform::from_position(Point3::new(0.0, 2.0, 0.0));
//! let velocity = Velocity::linear(Vector3::new(1.0, 0.0, 0.0));
//!
//! assert_eq!(transform.position.y, 2.0);
//! assert!(velocity.angular_speed() < 1e-10);
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod material;

pub use body::{BodyId, JointId, Transform, Velocity};
pub use config::{SleepConfig, WorldConfig};
pub use error::{ErrorKind, PhysicsError};
pub use material::Material;

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
