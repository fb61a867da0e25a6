//! Ray casting against the bodies of a world.
//!
//! All queries are read-only: the ray is transformed into each candidate
//! body's local frame, tested analytically against its shape, and the hit
//! point is transformed back to world space for the caller. Body AABBs are
//! used as a cheap pre-filter.

use nalgebra::{Point3, Vector3};
use rigid_collision::{Aabb, Shape};
use rigid_types::{BodyId, PhysicsError, Result};

use crate::world::DynamicsWorld;

/// A ray from an origin along a direction (not necessarily unit length).
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Starting point in world space.
    pub origin: Point3<f64>,
    /// Direction in world space.
    pub direction: Vector3<f64>,
}

/// A body hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// The intersected body.
    pub body: BodyId,
    /// The body's nearest intersection point, in world space.
    pub point: Point3<f64>,
}

impl DynamicsWorld {
    /// Find all bodies intersecting the ray, each with its nearest
    /// intersection point.
    ///
    /// Results are in no particular order.
    pub fn find_intersecting_bodies(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
    ) -> Result<Vec<RayHit>> {
        if direction.norm_squared() < 1e-20 {
            return Err(PhysicsError::ZeroLengthVector {
                context: "ray direction",
            });
        }

        let mut hits = Vec::new();
        for body in self.bodies() {
            if !body.is_collision_enabled() {
                continue;
            }
            if !ray_hits_aabb(&origin, &direction, body.aabb()) {
                continue;
            }
            let Some(shape) = self.body_shape(body.id()) else {
                continue;
            };

            let transform = body.transform();
            let local_origin = transform.inverse_transform_point(&origin);
            let local_direction = transform.inverse_transform_vector(&direction);

            if let Some(local_point) = intersect_shape(shape, &local_origin, &local_direction) {
                hits.push(RayHit {
                    body: body.id(),
                    point: transform.transform_point(&local_point),
                });
            }
        }
        Ok(hits)
    }

    /// Find the intersecting body whose hit point is closest to the ray
    /// origin.
    pub fn find_closest_intersecting_body(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
    ) -> Result<Option<RayHit>> {
        let hits = self.find_intersecting_bodies(origin, direction)?;
        Ok(hits.into_iter().min_by(|a, b| {
            let da = (a.point - origin).norm_squared();
            let db = (b.point - origin).norm_squared();
            da.total_cmp(&db)
        }))
    }

    /// Find the intersecting body whose hit point is furthest from the ray
    /// origin.
    pub fn find_furthest_intersecting_body(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
    ) -> Result<Option<RayHit>> {
        let hits = self.find_intersecting_bodies(origin, direction)?;
        Ok(hits.into_iter().max_by(|a, b| {
            let da = (a.point - origin).norm_squared();
            let db = (b.point - origin).norm_squared();
            da.total_cmp(&db)
        }))
    }
}

/// Slab test against a world-space AABB (pre-filter only).
fn ray_hits_aabb(origin: &Point3<f64>, direction: &Vector3<f64>, aabb: &Aabb) -> bool {
    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;
    for axis in 0..3 {
        if direction[axis].abs() < 1e-20 {
            if origin[axis] < aabb.min[axis] || origin[axis] > aabb.max[axis] {
                return false;
            }
            continue;
        }
        let inv = 1.0 / direction[axis];
        let mut t0 = (aabb.min[axis] - origin[axis]) * inv;
        let mut t1 = (aabb.max[axis] - origin[axis]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return false;
        }
    }
    t_max >= 0.0
}

/// Nearest intersection of a local-space ray with a shape, if any.
fn intersect_shape(
    shape: &Shape,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
) -> Option<Point3<f64>> {
    let t = match shape {
        Shape::Box { half_extents } => intersect_box(origin, direction, half_extents),
        Shape::Sphere { radius } => intersect_sphere(origin, direction, *radius),
        Shape::Cone {
            radius,
            half_height,
        } => intersect_cone(origin, direction, *radius, *half_height),
        Shape::Cylinder {
            radius,
            half_height,
        } => intersect_cylinder(origin, direction, *radius, *half_height),
    }?;
    Some(origin + direction * t)
}

/// Slab test against the box; returns the nearest non-negative parameter.
fn intersect_box(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    half_extents: &Vector3<f64>,
) -> Option<f64> {
    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;
    for axis in 0..3 {
        if direction[axis].abs() < 1e-20 {
            if origin[axis].abs() > half_extents[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / direction[axis];
        let mut t0 = (-half_extents[axis] - origin[axis]) * inv;
        let mut t1 = (half_extents[axis] - origin[axis]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    if t_max < 0.0 {
        return None;
    }
    Some(if t_min >= 0.0 { t_min } else { t_max })
}

/// Quadratic test against the sphere.
fn intersect_sphere(origin: &Point3<f64>, direction: &Vector3<f64>, radius: f64) -> Option<f64> {
    let a = direction.norm_squared();
    let b = 2.0 * direction.dot(&origin.coords);
    let c = origin.coords.norm_squared() - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let t0 = (-b - root) / (2.0 * a);
    let t1 = (-b + root) / (2.0 * a);
    if t1 < 0.0 {
        return None;
    }
    Some(if t0 >= 0.0 { t0 } else { t1 })
}

/// Lateral surface plus base cap of the cone (apex toward +Y).
fn intersect_cone(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    radius: f64,
    half_height: f64,
) -> Option<f64> {
    let (vx, vy, vz) = (direction.x, direction.y, direction.z);
    let (px, py, pz) = (origin.x, origin.y, origin.z);
    let h = half_height;
    // The cone's radius tapers from `radius` at -h to zero at +h; the
    // quadratic below uses the half-slope form r(y) = (R/2)(1 - y/h)
    let r = radius / 2.0;
    let r2 = r * r;
    let h2 = h * h;

    let a = vx * vx + vz * vz - (vy * vy * r2) / h2;
    let b = 2.0 * px * vx + 2.0 * pz * vz - (2.0 * r2 * py * vy) / h2 + (2.0 * r2 * vy) / h;
    let c = px * px + pz * pz - r * r - (r2 * py * py) / h2 + (2.0 * r2 * py) / h;

    let mut best = f64::INFINITY;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant >= 0.0 && a.abs() > 1e-20 {
        let root = discriminant.sqrt();
        for t in [(-b + root) / (2.0 * a), (-b - root) / (2.0 * a)] {
            if t >= 0.0 {
                let y = py + vy * t;
                if y >= -h && y <= h && t < best {
                    best = t;
                }
            }
        }
    }

    // Base cap at y = -h
    if vy.abs() > 1e-20 {
        let t = (-h - py) / vy;
        if t >= 0.0 && t < best {
            let x = px + vx * t;
            let z = pz + vz * t;
            if x * x + z * z <= 4.0 * r * r {
                best = t;
            }
        }
    }

    if best.is_finite() {
        Some(best)
    } else {
        None
    }
}

/// Lateral surface plus both caps of the cylinder (axis along Y).
fn intersect_cylinder(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    radius: f64,
    half_height: f64,
) -> Option<f64> {
    let (vx, vy, vz) = (direction.x, direction.y, direction.z);
    let (px, py, pz) = (origin.x, origin.y, origin.z);
    let h = half_height;
    let r2 = radius * radius;

    let a = vx * vx + vz * vz;
    let b = 2.0 * px * vx + 2.0 * pz * vz;
    let c = px * px + pz * pz - r2;

    let mut best = f64::INFINITY;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant >= 0.0 && a > 1e-20 {
        let root = discriminant.sqrt();
        for t in [(-b + root) / (2.0 * a), (-b - root) / (2.0 * a)] {
            if t >= 0.0 {
                let y = py + vy * t;
                if y >= -h && y <= h && t < best {
                    best = t;
                }
            }
        }
    }

    // End caps at y = +h and y = -h
    if vy.abs() > 1e-20 {
        for cap in [h, -h] {
            let t = (cap - py) / vy;
            if t >= 0.0 && t < best {
                let x = px + vx * t;
                let z = pz + vz * t;
                if x * x + z * z <= r2 {
                    best = t;
                }
            }
        }
    }

    if best.is_finite() {
        Some(best)
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rigid_types::{Transform, WorldConfig};

    fn world() -> DynamicsWorld {
        DynamicsWorld::new(WorldConfig::default()).expect("valid config")
    }

    #[test]
    fn test_zero_direction_is_rejected() {
        let world = world();
        let err = world
            .find_intersecting_bodies(Point3::origin(), Vector3::zeros())
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_ray_hits_sphere() {
        let mut world = world();
        let shape = Shape::sphere(1.0);
        let body = world
            .create_body(
                Transform::from_position(Point3::new(0.0, 0.0, 5.0)),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        let hit = world
            .find_closest_intersecting_body(Point3::origin(), Vector3::z())
            .unwrap()
            .expect("ray hits the sphere");
        assert_eq!(hit.body, body);
        // Nearest surface point of a unit sphere centered at z = 5
        assert_relative_eq!(hit.point.z, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ray_misses_offset_sphere() {
        let mut world = world();
        let shape = Shape::sphere(1.0);
        world
            .create_body(
                Transform::from_position(Point3::new(5.0, 0.0, 5.0)),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        let hits = world
            .find_intersecting_bodies(Point3::origin(), Vector3::z())
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_ray_hits_rotated_box() {
        use nalgebra::UnitQuaternion;
        let mut world = world();
        let shape = Shape::box_shape(Vector3::new(1.0, 1.0, 1.0));
        world
            .create_body(
                Transform::from_position_orientation(
                    Point3::new(0.0, 0.0, 5.0),
                    UnitQuaternion::from_euler_angles(0.0, std::f64::consts::FRAC_PI_4, 0.0),
                ),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        // Slightly off-center so the ray meets a face, not the edge
        let hit = world
            .find_closest_intersecting_body(Point3::new(0.2, 0.0, 0.0), Vector3::z())
            .unwrap()
            .expect("ray hits the rotated box");
        // The face is closer than the unrotated cube's face at z = 4 but no
        // closer than the leading edge at z = 5 - sqrt(2)
        assert!(hit.point.z < 4.0);
        assert!(hit.point.z >= 5.0 - std::f64::consts::SQRT_2 - 1e-9);
    }

    #[test]
    fn test_closest_and_furthest_ordering() {
        let mut world = world();
        let shape = Shape::sphere(0.5);
        let near = world
            .create_body(
                Transform::from_position(Point3::new(0.0, 0.0, 2.0)),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();
        let far = world
            .create_body(
                Transform::from_position(Point3::new(0.0, 0.0, 8.0)),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        let closest = world
            .find_closest_intersecting_body(Point3::origin(), Vector3::z())
            .unwrap()
            .expect("hit");
        let furthest = world
            .find_furthest_intersecting_body(Point3::origin(), Vector3::z())
            .unwrap()
            .expect("hit");
        assert_eq!(closest.body, near);
        assert_eq!(furthest.body, far);
        assert!(furthest.point.z > closest.point.z);
    }

    #[test]
    fn test_ray_hits_cylinder_cap() {
        let mut world = world();
        let shape = Shape::cylinder(1.0, 2.0);
        world
            .create_body(
                Transform::from_position(Point3::new(0.0, -5.0, 0.0)),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        // Straight down onto the top cap at y = -4
        let hit = world
            .find_closest_intersecting_body(Point3::origin(), -Vector3::y())
            .unwrap()
            .expect("ray hits the cylinder");
        assert_relative_eq!(hit.point.y, -4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ray_hits_cone_side_and_base() {
        let mut world = world();
        let shape = Shape::cone(1.0, 2.0);
        world
            .create_body(
                Transform::from_position(Point3::new(0.0, 0.0, 5.0)),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        // Through the base plane from below
        let hit = world
            .find_closest_intersecting_body(Point3::new(0.0, -5.0, 5.0), Vector3::y())
            .unwrap()
            .expect("ray hits the cone base");
        assert_relative_eq!(hit.point.y, -1.0, epsilon = 1e-9);

        // Horizontally at the base height: the lateral surface has full
        // radius there
        let hit = world
            .find_closest_intersecting_body(Point3::new(0.0, -0.999, 0.0), Vector3::z())
            .unwrap()
            .expect("ray hits the cone side");
        assert!(hit.point.z > 3.9 && hit.point.z < 4.1);
    }

    #[test]
    fn test_ray_starting_inside_box() {
        let mut world = world();
        let shape = Shape::box_shape(Vector3::new(1.0, 1.0, 1.0));
        world
            .create_body(
                Transform::identity(),
                1.0,
                shape.local_inertia(1.0),
                shape,
            )
            .unwrap();

        // From the center, the exit face is reported
        let hit = world
            .find_closest_intersecting_body(Point3::origin(), Vector3::x())
            .unwrap()
            .expect("hit from inside");
        assert_relative_eq!(hit.point.x, 1.0, epsilon = 1e-9);
    }
}
