//! Surface materials for contact response.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Surface properties of a rigid body used by the contact solver.
///
/// # Example
///
/// ```
/// use rigid_types::Material;
///
/// let bouncy = Material::new(0.9, 0.2);
/// let rough = Material::new(0.0, 1.0);
///
/// let combined = bouncy.combine(&rough);
/// assert_eq!(combined.restitution, 0.9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Coefficient of restitution in [0, 1]. 0 = perfectly inelastic,
    /// 1 = perfectly elastic.
    pub restitution: f64,
    /// Coulomb friction coefficient, >= 0.
    pub friction: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.0,
            friction: 0.3,
        }
    }
}

impl Material {
    /// Create a material, clamping restitution to [0, 1] and friction to >= 0.
    #[must_use]
    pub fn new(restitution: f64, friction: f64) -> Self {
        Self {
            restitution: restitution.clamp(0.0, 1.0),
            friction: friction.max(0.0),
        }
    }

    /// A frictionless, perfectly inelastic material.
    #[must_use]
    pub fn frictionless() -> Self {
        Self {
            restitution: 0.0,
            friction: 0.0,
        }
    }

    /// Combine two materials for a contact pair.
    ///
    /// Restitution takes the maximum of the two (the bouncier surface wins),
    /// friction the geometric mean.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            restitution: self.restitution.max(other.restitution),
            friction: (self.friction * other.friction).sqrt(),
        }
    }
}
