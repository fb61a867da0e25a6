//! Error types for physics operations.

use thiserror::Error;

/// Broad classification of a [`PhysicsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed a value the API cannot accept.
    InvalidArgument,
    /// The operation is inconsistent with the world's current state.
    InvalidState,
}

/// Errors that can occur during world operations.
///
/// Every error is local to the offending call: the world's state machine
/// remains valid and no partial mutation survives a rejected call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// A body ID that does not refer to a live body.
    #[error("unknown body ID: {0}")]
    UnknownBody(u32),

    /// A joint ID that does not refer to a live joint.
    #[error("unknown joint ID: {0}")]
    UnknownJoint(u32),

    /// A joint removal referenced a joint not attached to the world.
    #[error("joint {0} is not attached to this world")]
    JointNotAttached(u32),

    /// A shape handle that does not refer to a registered shape.
    #[error("unknown shape handle: {0}")]
    UnknownShape(usize),

    /// Damping coefficients must be non-negative.
    #[error("negative damping coefficient: {0}")]
    NegativeDamping(f64),

    /// The body ID space is exhausted.
    #[error("body id space exhausted (limit {limit})")]
    IdSpaceExhausted {
        /// The maximum representable id.
        limit: u32,
    },

    /// A zero-length vector was provided where a direction is required.
    #[error("zero-length vector in {context}")]
    ZeroLengthVector {
        /// Where the degenerate vector was encountered.
        context: &'static str,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: &'static str,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl PhysicsError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NegativeDamping(_)
            | Self::UnknownShape(_)
            | Self::ZeroLengthVector { .. }
            | Self::InvalidMassProperties { .. }
            | Self::InvalidTimestep(_)
            | Self::InvalidConfig { .. } => ErrorKind::InvalidArgument,
            Self::UnknownBody(_)
            | Self::UnknownJoint(_)
            | Self::JointNotAttached(_)
            | Self::IdSpaceExhausted { .. } => ErrorKind::InvalidState,
        }
    }

    /// Check whether this error rejects a caller-supplied value.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// Check whether this error reflects inconsistent world state.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        self.kind() == ErrorKind::InvalidState
    }
}
