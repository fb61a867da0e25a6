//! Collision shapes and the shared-shape registry.
//!
//! Every shape provides the small capability set the rest of the engine
//! needs: a support mapping with and without margin (consumed by GJK/EPA),
//! local extents for AABB refresh, a per-mass local inertia tensor, and a
//! collision margin. Shapes are value objects; the [`ShapeRegistry`]
//! deduplicates equal shapes within a world by reference count.

use nalgebra::{Matrix3, Point3, Vector3};
use rigid_types::{PhysicsError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Collision margin added around the box, cone and cylinder shapes.
///
/// Contact is reported when the margin-enlarged surfaces touch, slightly
/// before the declared surfaces do; contact points are projected back onto
/// the declared surfaces.
pub const COLLISION_MARGIN: f64 = 0.04;

/// Tolerance for degenerate support directions.
const SUPPORT_EPSILON: f64 = 1e-12;

/// A convex collision shape in local coordinates.
///
/// Cone and cylinder are aligned with the local Y axis; the cone's apex
/// points toward +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Axis-aligned box with half-extents.
    Box {
        /// Half-extents along each local axis.
        half_extents: Vector3<f64>,
    },
    /// Sphere centered at the local origin.
    Sphere {
        /// Sphere radius in meters.
        radius: f64,
    },
    /// Cone around the local Y axis, apex at `+half_height`.
    Cone {
        /// Base radius.
        radius: f64,
        /// Half of the full height.
        half_height: f64,
    },
    /// Cylinder around the local Y axis.
    Cylinder {
        /// Radius of the circular cross-section.
        radius: f64,
        /// Half of the full height.
        half_height: f64,
    },
}

impl Shape {
    /// Create a box from half-extents.
    #[must_use]
    pub const fn box_shape(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// Create a sphere from its radius.
    #[must_use]
    pub const fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a cone from base radius and full height.
    #[must_use]
    pub fn cone(radius: f64, height: f64) -> Self {
        Self::Cone {
            radius,
            half_height: height * 0.5,
        }
    }

    /// Create a cylinder from radius and full height.
    #[must_use]
    pub fn cylinder(radius: f64, height: f64) -> Self {
        Self::Cylinder {
            radius,
            half_height: height * 0.5,
        }
    }

    /// The collision margin of this shape.
    ///
    /// For the sphere the margin is the radius itself: its support core is
    /// the center point, which keeps the GJK simplex maximally stable.
    #[must_use]
    pub fn margin(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { .. } | Self::Cone { .. } | Self::Cylinder { .. } => COLLISION_MARGIN,
        }
    }

    /// Local support point of the margin-less core in the given direction.
    ///
    /// The direction does not need to be normalized; a degenerate direction
    /// falls back to an arbitrary axis.
    #[must_use]
    pub fn local_support_without_margin(&self, direction: &Vector3<f64>) -> Point3<f64> {
        match self {
            Self::Sphere { .. } => Point3::origin(),
            Self::Box { half_extents } => Point3::new(
                if direction.x >= 0.0 {
                    half_extents.x
                } else {
                    -half_extents.x
                },
                if direction.y >= 0.0 {
                    half_extents.y
                } else {
                    -half_extents.y
                },
                if direction.z >= 0.0 {
                    half_extents.z
                } else {
                    -half_extents.z
                },
            ),
            Self::Cone {
                radius,
                half_height,
            } => {
                // The apex wins when the direction is inside the cone of
                // normals at the tip; otherwise a point on the base rim.
                let norm = direction.norm();
                let sin_theta =
                    radius / (radius * radius + 4.0 * half_height * half_height).sqrt();
                if norm > SUPPORT_EPSILON && direction.y > norm * sin_theta {
                    Point3::new(0.0, *half_height, 0.0)
                } else {
                    let radial = Vector3::new(direction.x, 0.0, direction.z);
                    let radial_norm = radial.norm();
                    if radial_norm > SUPPORT_EPSILON {
                        Point3::new(
                            radius * direction.x / radial_norm,
                            -half_height,
                            radius * direction.z / radial_norm,
                        )
                    } else {
                        Point3::new(0.0, -half_height, 0.0)
                    }
                }
            }
            Self::Cylinder {
                radius,
                half_height,
            } => {
                let y = if direction.y >= 0.0 {
                    *half_height
                } else {
                    -half_height
                };
                let radial = Vector3::new(direction.x, 0.0, direction.z);
                let radial_norm = radial.norm();
                if radial_norm > SUPPORT_EPSILON {
                    Point3::new(
                        radius * direction.x / radial_norm,
                        y,
                        radius * direction.z / radial_norm,
                    )
                } else {
                    Point3::new(0.0, y, 0.0)
                }
            }
        }
    }

    /// Local support point including the collision margin.
    #[must_use]
    pub fn local_support_with_margin(&self, direction: &Vector3<f64>) -> Point3<f64> {
        let core = self.local_support_without_margin(direction);
        let norm = direction.norm();
        let unit = if norm > SUPPORT_EPSILON {
            direction / norm
        } else {
            Vector3::y()
        };
        core + unit * self.margin()
    }

    /// Local half-extents of the shape inflated by `margin`, for AABB refresh.
    #[must_use]
    pub fn local_extents(&self, margin: f64) -> Vector3<f64> {
        match self {
            Self::Box { half_extents } => {
                half_extents + Vector3::new(margin, margin, margin)
            }
            Self::Sphere { radius } => {
                let r = radius + margin;
                Vector3::new(r, r, r)
            }
            Self::Cone {
                radius,
                half_height,
            }
            | Self::Cylinder {
                radius,
                half_height,
            } => Vector3::new(radius + margin, half_height + margin, radius + margin),
        }
    }

    /// Local inertia tensor for the given mass.
    ///
    /// All supported primitives have a diagonal tensor in their local frame.
    #[must_use]
    pub fn local_inertia(&self, mass: f64) -> Matrix3<f64> {
        let diagonal = match self {
            Self::Box { half_extents } => {
                let x2 = half_extents.x * half_extents.x;
                let y2 = half_extents.y * half_extents.y;
                let z2 = half_extents.z * half_extents.z;
                let third = mass / 3.0;
                Vector3::new(third * (y2 + z2), third * (x2 + z2), third * (x2 + y2))
            }
            Self::Sphere { radius } => {
                let i = 0.4 * mass * radius * radius;
                Vector3::new(i, i, i)
            }
            Self::Cone {
                radius,
                half_height,
            } => {
                let r2 = radius * radius;
                let h = 2.0 * half_height;
                // Solid cone about its centroid: 3/20 m r² + 3/80 m h²
                // transverse, 3/10 m r² about the axis of symmetry.
                let transverse = 0.15 * mass * r2 + 0.0375 * mass * h * h;
                Vector3::new(transverse, 0.3 * mass * r2, transverse)
            }
            Self::Cylinder {
                radius,
                half_height,
            } => {
                let r2 = radius * radius;
                let h = 2.0 * half_height;
                let transverse = mass / 12.0 * (3.0 * r2 + h * h);
                Vector3::new(transverse, 0.5 * mass * r2, transverse)
            }
        };
        Matrix3::from_diagonal(&diagonal)
    }
}

/// Handle to a shape registered in a [`ShapeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeHandle(usize);

impl ShapeHandle {
    /// Get the handle as an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Reference-counted storage for the shapes of one world.
///
/// Equal shapes are shared: `acquire` returns the handle of an existing
/// equal shape and bumps its count instead of storing a second copy.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    entries: Vec<Option<ShapeEntry>>,
    free: Vec<usize>,
}

#[derive(Debug)]
struct ShapeEntry {
    shape: Shape,
    ref_count: usize,
}

impl ShapeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shape, reusing an existing equal entry when possible.
    pub fn acquire(&mut self, shape: Shape) -> ShapeHandle {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if let Some(entry) = entry {
                if entry.shape == shape {
                    entry.ref_count += 1;
                    return ShapeHandle(index);
                }
            }
        }

        let entry = ShapeEntry {
            shape,
            ref_count: 1,
        };
        if let Some(index) = self.free.pop() {
            self.entries[index] = Some(entry);
            ShapeHandle(index)
        } else {
            self.entries.push(Some(entry));
            ShapeHandle(self.entries.len() - 1)
        }
    }

    /// Release one reference; the shape is dropped when the count hits zero.
    pub fn release(&mut self, handle: ShapeHandle) -> Result<()> {
        let entry = self
            .entries
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::UnknownShape(handle.0))?;

        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            self.entries[handle.0] = None;
            self.free.push(handle.0);
        }
        Ok(())
    }

    /// Look up a shape by handle.
    #[must_use]
    pub fn get(&self, handle: ShapeHandle) -> Option<&Shape> {
        self.entries
            .get(handle.0)
            .and_then(Option::as_ref)
            .map(|e| &e.shape)
    }

    /// Number of distinct live shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
