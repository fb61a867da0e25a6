//! Constraint solving for the rigid-body physics engine.
//!
//! Three pieces sit between collision detection and integration:
//!
//! - [`Joint`] / [`JointDesc`] - ball-socket, hinge, slider and fixed
//!   constraints with their accumulated multipliers
//! - [`build_islands`] - partitioning of awake bodies and their constraints
//!   into independently solvable groups
//! - [`solve_island`] - the sequential-impulse (projected Gauss-Seidel)
//!   velocity and position solver
//!
//! The crate has no notion of a world or a body store: the dynamics layer
//! hands it dense [`SolverBody`] slices, manifolds and joints, and writes
//! the solved velocities back.
//!
//! # Example
//!
//! ```
//! use rigid_constraint::{build_islands, BodyFlags};
//! use rigid_types::BodyId;
//!
//! let flags = vec![
//!     BodyFlags { exists: true, dynamic: true, awake: true },
//!     BodyFlags { exists: true, dynamic: true, awake: true },
//! ];
//! // Two bodies sharing one contact manifold form one island
//! let contacts = vec![(0usize, BodyId::new(0), BodyId::new(1))];
//! let islands = build_islands(&flags, &contacts, &[]);
//! assert_eq!(islands.len(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod island;
mod joint;
mod solver;

pub use island::{build_islands, BodyFlags, Island};
pub use joint::{Joint, JointDesc, JointKind};
pub use solver::{
    solve_island, SolverBody, SolverParams, BAUMGARTE, PENETRATION_SLOP, RESTITUTION_THRESHOLD,
};
