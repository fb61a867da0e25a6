//! Configuration for the dynamics world.

use nalgebra::Vector3;

use crate::{PhysicsError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sleep thresholds and timing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Linear speed below which a body is a sleep candidate (m/s).
    pub linear_threshold: f64,
    /// Angular speed below which a body is a sleep candidate (rad/s).
    pub angular_threshold: f64,
    /// Time a whole island must stay below the thresholds before it is
    /// put to sleep (seconds).
    pub time_before_sleep: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            linear_threshold: 0.02,
            angular_threshold: 0.05,
            time_before_sleep: 1.0,
        }
    }
}

/// Main configuration for a dynamics world.
///
/// # Example
///
/// ```
/// use rigid_types::WorldConfig;
/// use nalgebra::Vector3;
///
/// let config = WorldConfig::default()
///     .with_gravity(Vector3::new(0.0, -3.71, 0.0))  // Mars
///     .with_velocity_iterations(16);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Gravity acceleration vector (m/s²).
    pub gravity: Vector3<f64>,
    /// Fixed timestep for each `update()` call (seconds).
    pub timestep: f64,
    /// Number of velocity solver iterations per step.
    pub velocity_iterations: usize,
    /// Number of position correction iterations per step.
    pub position_iterations: usize,
    /// Global gravity toggle.
    pub gravity_enabled: bool,
    /// Whether idle islands may be put to sleep.
    pub sleeping_enabled: bool,
    /// Restitution assigned to bodies created without an explicit material.
    pub default_restitution: f64,
    /// Friction assigned to bodies created without an explicit material.
    pub default_friction: f64,
    /// Sleep thresholds and timing.
    pub sleep: SleepConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            timestep: 1.0 / 60.0,
            velocity_iterations: 10,
            position_iterations: 5,
            gravity_enabled: true,
            sleeping_enabled: true,
            default_restitution: 0.0,
            default_friction: 0.3,
            sleep: SleepConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Create a configuration with the given fixed timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Set the gravity vector.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity (zero-G environment).
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the velocity iteration count.
    #[must_use]
    pub fn with_velocity_iterations(mut self, iterations: usize) -> Self {
        self.velocity_iterations = iterations;
        self
    }

    /// Set the position iteration count.
    #[must_use]
    pub fn with_position_iterations(mut self, iterations: usize) -> Self {
        self.position_iterations = iterations;
        self
    }

    /// Keep every body awake forever.
    #[must_use]
    pub fn without_sleeping(mut self) -> Self {
        self.sleeping_enabled = false;
        self
    }

    /// Set the default material coefficients for new bodies.
    #[must_use]
    pub fn with_default_material(mut self, restitution: f64, friction: f64) -> Self {
        self.default_restitution = restitution.clamp(0.0, 1.0);
        self.default_friction = friction.max(0.0);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(PhysicsError::InvalidTimestep(self.timestep));
        }
        if self.timestep > 1.0 {
            return Err(PhysicsError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::invalid_config(
                "velocity_iterations must be at least 1",
            ));
        }
        if !self.gravity.iter().all(|x| x.is_finite()) {
            return Err(PhysicsError::invalid_config("gravity must be finite"));
        }
        if self.sleep.time_before_sleep <= 0.0 {
            return Err(PhysicsError::invalid_config(
                "time_before_sleep must be positive",
            ));
        }
        Ok(())
    }

    /// Get the step frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(WorldConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_timestep() {
        assert!(WorldConfig::with_timestep(0.0).validate().is_err());
        assert!(WorldConfig::with_timestep(f64::NAN).validate().is_err());
        assert!(WorldConfig::with_timestep(2.0).validate().is_err());
    }

    #[test]
    fn test_rejects_zero_velocity_iterations() {
        let config = WorldConfig::default().with_velocity_iterations(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = WorldConfig::default()
            .zero_gravity()
            .without_sleeping()
            .with_default_material(0.5, 0.8);

        assert_eq!(config.gravity.norm(), 0.0);
        assert!(!config.sleeping_enabled);
        assert_eq!(config.default_restitution, 0.5);
    }
}
