//! Narrow-phase dispatch.
//!
//! Stateless: given two shapes and their transforms, either report "no
//! contact" or produce a single [`ContactPointInfo`]. Persistence across
//! frames is the manifold store's job.

use nalgebra::{Point3, Vector3};
use rigid_types::Transform;

use crate::gjk_epa;
use crate::shape::Shape;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One fresh contact reported by the narrow phase.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPointInfo {
    /// Unit contact normal pointing from body A toward body B.
    pub normal: Vector3<f64>,
    /// Penetration depth, >= 0.
    pub penetration: f64,
    /// Contact point in body A's local frame.
    pub local_a: Point3<f64>,
    /// Contact point in body B's local frame.
    pub local_b: Point3<f64>,
}

/// Test a shape pair for contact.
///
/// Sphere/sphere is handled analytically; every other combination goes
/// through GJK, with EPA for penetrating configurations.
#[must_use]
pub fn collide(
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> Option<ContactPointInfo> {
    match (shape_a, shape_b) {
        (Shape::Sphere { radius: radius_a }, Shape::Sphere { radius: radius_b }) => {
            sphere_sphere(*radius_a, transform_a, *radius_b, transform_b)
        }
        _ => {
            let contact = gjk_epa::contact(shape_a, transform_a, shape_b, transform_b)?;
            Some(ContactPointInfo {
                normal: contact.normal,
                penetration: contact.penetration,
                local_a: transform_a.inverse_transform_point(&contact.world_a),
                local_b: transform_b.inverse_transform_point(&contact.world_b),
            })
        }
    }
}

/// Analytic sphere-sphere test.
fn sphere_sphere(
    radius_a: f64,
    transform_a: &Transform,
    radius_b: f64,
    transform_b: &Transform,
) -> Option<ContactPointInfo> {
    let delta = transform_b.position - transform_a.position;
    let sum_radii = radius_a + radius_b;
    let dist_squared = delta.norm_squared();
    if dist_squared > sum_radii * sum_radii {
        return None;
    }

    let distance = dist_squared.sqrt();
    let normal = if distance > 1e-12 {
        delta / distance
    } else {
        // Concentric spheres: any direction separates them
        Vector3::y()
    };

    let world_a = transform_a.position + normal * radius_a;
    let world_b = transform_b.position - normal * radius_b;

    Some(ContactPointInfo {
        normal,
        penetration: sum_radii - distance,
        local_a: transform_a.inverse_transform_point(&world_a),
        local_b: transform_b.inverse_transform_point(&world_b),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(x: f64, y: f64, z: f64) -> Transform {
        Transform::from_position(Point3::new(x, y, z))
    }

    #[test]
    fn test_sphere_sphere_separated() {
        let result = collide(
            &Shape::sphere(0.5),
            &at(0.0, 0.0, 0.0),
            &Shape::sphere(0.5),
            &at(2.0, 0.0, 0.0),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_sphere_sphere_contact() {
        let info = collide(
            &Shape::sphere(0.5),
            &at(0.0, 0.0, 0.0),
            &Shape::sphere(0.5),
            &at(0.8, 0.0, 0.0),
        )
        .expect("spheres overlap");

        assert_relative_eq!(info.normal.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(info.penetration, 0.2, epsilon = 1e-12);
        // Local points lie on each sphere's surface along the normal
        assert_relative_eq!(info.local_a.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(info.local_b.x, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_sphere_normal_is_unit() {
        let info = collide(
            &Shape::sphere(1.0),
            &at(0.0, 0.0, 0.0),
            &Shape::sphere(1.0),
            &at(0.7, 0.9, -0.3),
        )
        .expect("spheres overlap");
        assert_relative_eq!(info.normal.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_pair_goes_through_gjk() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let info = collide(&unit_box, &at(0.0, 0.0, 0.0), &unit_box, &at(0.9, 0.0, 0.0))
            .expect("boxes overlap");
        assert!(info.penetration > 0.0);
        assert_relative_eq!(info.normal.norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_local_points_transform_back_consistently() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let sphere = Shape::sphere(0.5);
        let ta = at(0.0, 0.0, 0.0);
        let tb = at(0.0, 0.9, 0.0);
        let info = collide(&unit_box, &ta, &sphere, &tb).expect("contact");

        let world_a = ta.transform_point(&info.local_a);
        let world_b = tb.transform_point(&info.local_b);
        // Anchors separated along the normal by the penetration depth
        let separation = (world_a - world_b).dot(&info.normal);
        assert_relative_eq!(separation, info.penetration, epsilon = 1e-6);
    }
}
