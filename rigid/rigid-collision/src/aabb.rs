//! Axis-aligned bounding boxes.

use nalgebra::{Point3, Vector3};
use rigid_types::Transform;

use crate::shape::Shape;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Compute the world-space AABB of a shape at a transform.
    ///
    /// Uses the shape's local extents rotated through the orientation
    /// (componentwise absolute rotation matrix), which is exact for boxes
    /// and conservative for the curved shapes.
    #[must_use]
    pub fn from_shape(shape: &Shape, transform: &Transform, margin: f64) -> Self {
        let extents = shape.local_extents(margin);
        let world_extents = transform.rotation_matrix().abs() * extents;
        Self::from_center(transform.position, world_extents)
    }

    /// Check if this AABB overlaps with another AABB on all three axes.
    ///
    /// Touching boxes count as overlapping (closed intervals).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check if a point is inside this AABB.
    #[must_use]
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// The smallest AABB enclosing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::new(margin, margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Get the minimum value along an axis (0 = X, 1 = Y, 2 = Z).
    #[must_use]
    pub fn min_on_axis(&self, axis: usize) -> f64 {
        self.min[axis]
    }

    /// Get the maximum value along an axis (0 = X, 1 = Y, 2 = Z).
    #[must_use]
    pub fn max_on_axis(&self, axis: usize) -> f64 {
        self.max[axis]
    }

    /// Check whether the intervals of two boxes overlap on one axis.
    #[must_use]
    pub fn overlaps_on_axis(&self, other: &Self, axis: usize) -> bool {
        self.min[axis] <= other.max[axis] && self.max[axis] >= other.min[axis]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_overlaps() {
        let a = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Aabb::from_center(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");
    }

    #[test]
    fn test_touching_counts_as_overlap() {
        let a = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(2.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_union_contains_both() {
        let a = Aabb::from_center(Point3::new(-1.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(3.0, 1.0, 0.0), Vector3::new(0.5, 0.5, 0.5));
        let u = a.union(&b);

        assert!(u.contains_point(&a.min) && u.contains_point(&a.max));
        assert!(u.contains_point(&b.min) && u.contains_point(&b.max));
    }

    #[test]
    fn test_from_shape_axis_aligned_box() {
        let shape = Shape::box_shape(Vector3::new(1.0, 2.0, 3.0));
        let aabb = Aabb::from_shape(&shape, &Transform::identity(), 0.0);

        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_from_shape_rotated_box_grows() {
        let shape = Shape::box_shape(Vector3::new(1.0, 1.0, 1.0));
        let transform = Transform::from_position_orientation(
            Point3::origin(),
            UnitQuaternion::from_euler_angles(0.0, std::f64::consts::FRAC_PI_4, 0.0),
        );
        let aabb = Aabb::from_shape(&shape, &transform, 0.0);

        // A unit cube rotated 45 degrees about Y spans sqrt(2) on X and Z
        let expected = std::f64::consts::SQRT_2;
        assert!((aabb.max.x - expected).abs() < 1e-12);
        assert!((aabb.max.z - expected).abs() < 1e-12);
        assert!((aabb.max.y - 1.0).abs() < 1e-12);
    }
}
