//! GJK (Gilbert-Johnson-Keerthi) and EPA (Expanding Polytope Algorithm).
//!
//! Narrow-phase collision detection for convex shapes. GJK runs on the
//! margin-less support cores and computes either the closest points between
//! the cores or, when the cores overlap, a simplex enclosing the origin of
//! their Minkowski difference. EPA then expands that simplex to the minimum
//! translation vector.
//!
//! Margins are handled analytically on top of the core result: contact is
//! reported once the margin-enlarged surfaces touch (slightly before the
//! declared surfaces do), and the core witness points are projected out onto
//! the margin surfaces along the contact normal.
//!
//! # References
//!
//! - Gilbert, Johnson, Keerthi: "A Fast Procedure for Computing the Distance
//!   Between Complex Objects in Three-Dimensional Space" (1988)
//! - van den Bergen: "Collision Detection in Interactive 3D Environments" (2003)
//! - Ericson: "Real-Time Collision Detection" (2005), closest-point tests

use nalgebra::{Point3, Vector3};
use rigid_types::Transform;

use crate::shape::Shape;

/// Tolerance for numerical comparisons in GJK/EPA.
const EPSILON: f64 = 1e-10;

/// Maximum iterations for GJK before giving up.
const GJK_MAX_ITERATIONS: usize = 64;

/// Relative convergence tolerance for the GJK distance loop.
const GJK_REL_TOLERANCE: f64 = 1e-9;

/// Maximum iterations for EPA before giving up.
const EPA_MAX_ITERATIONS: usize = 64;

/// Maximum faces in the EPA polytope.
const EPA_MAX_FACES: usize = 128;

/// EPA convergence tolerance (absolute gain per expansion).
const EPA_TOLERANCE: f64 = 1e-6;

/// A point in Minkowski space, with the support points of both cores.
#[derive(Debug, Clone, Copy, Default)]
struct MinkowskiPoint {
    /// The point in Minkowski space (`support_a` - `support_b`).
    point: Point3<f64>,
    /// Support point of core A in world space.
    support_a: Point3<f64>,
    /// Support point of core B in world space.
    support_b: Point3<f64>,
}

/// A simplex of 1-4 Minkowski points.
#[derive(Debug, Clone, Default)]
struct Simplex {
    points: [MinkowskiPoint; 4],
    size: usize,
}

impl Simplex {
    fn push(&mut self, point: MinkowskiPoint) {
        debug_assert!(self.size < 4);
        self.points[self.size] = point;
        self.size += 1;
    }

    fn points(&self) -> &[MinkowskiPoint] {
        &self.points[..self.size]
    }

    fn contains(&self, point: &Point3<f64>) -> bool {
        self.points()
            .iter()
            .any(|p| (p.point - point).norm_squared() < EPSILON)
    }

    /// Replace the simplex with a subset of its points.
    fn reduce(&mut self, keep: &[usize]) {
        let mut reduced = [MinkowskiPoint::default(); 4];
        for (slot, &index) in keep.iter().enumerate() {
            reduced[slot] = self.points[index];
        }
        self.points = reduced;
        self.size = keep.len();
    }
}

/// Result of the narrow-phase query for one shape pair.
#[derive(Debug, Clone, Copy)]
pub struct GjkEpaContact {
    /// Unit contact normal pointing from shape A toward shape B.
    pub normal: Vector3<f64>,
    /// Penetration depth of the declared (margin) surfaces, >= 0.
    pub penetration: f64,
    /// Contact point on shape A's surface in world space.
    pub world_a: Point3<f64>,
    /// Contact point on shape B's surface in world space.
    pub world_b: Point3<f64>,
}

/// Outcome of the core GJK distance query.
enum GjkCase {
    /// Cores are separated; closest points and distance between them.
    Separated {
        point_a: Point3<f64>,
        point_b: Point3<f64>,
        distance: f64,
    },
    /// Cores overlap; the simplex encloses the origin.
    Overlapping(Simplex),
}

/// World-space support point of a shape's margin-less core.
fn support_world(shape: &Shape, transform: &Transform, direction: &Vector3<f64>) -> Point3<f64> {
    let local_dir = transform.inverse_transform_vector(direction);
    transform.transform_point(&shape.local_support_without_margin(&local_dir))
}

/// Support point on the Minkowski difference of the two cores, A - B.
fn support_minkowski(
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
    direction: &Vector3<f64>,
) -> MinkowskiPoint {
    let support_a = support_world(shape_a, transform_a, direction);
    let support_b = support_world(shape_b, transform_b, &-direction);
    MinkowskiPoint {
        point: Point3::from(support_a - support_b),
        support_a,
        support_b,
    }
}

// =============================================================================
// Closest-point tests (Ericson)
// =============================================================================

/// Closest point to the origin on a segment; barycentric weights for (a, b).
fn closest_on_segment(a: &Point3<f64>, b: &Point3<f64>) -> [f64; 2] {
    let ab = b - a;
    let denom = ab.norm_squared();
    if denom < EPSILON {
        return [1.0, 0.0];
    }
    let t = (-a.coords.dot(&ab) / denom).clamp(0.0, 1.0);
    [1.0 - t, t]
}

/// Closest point to the origin on a triangle; barycentric weights for
/// (a, b, c). Weights of vertices outside the supporting feature are zero.
fn closest_on_triangle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> [f64; 3] {
    let ab = b - a;
    let ac = c - a;
    let ap = -a.coords;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return [1.0, 0.0, 0.0];
    }

    let bp = -b.coords;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return [0.0, 1.0, 0.0];
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return [1.0 - t, t, 0.0];
    }

    let cp = -c.coords;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return [0.0, 0.0, 1.0];
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return [1.0 - t, 0.0, t];
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return [0.0, 1.0 - t, t];
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    [1.0 - v - w, v, w]
}

/// Check whether the origin is inside the tetrahedron (p0, p1, p2, p3).
fn origin_in_tetrahedron(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> bool {
    let same_side = |a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>| {
        let normal = (b - a).cross(&(c - a));
        let d_side = normal.dot(&(d - a));
        let origin_side = normal.dot(&-a.coords);
        if d_side.abs() < EPSILON {
            // Degenerate (flat) tetrahedron: treat the origin as outside
            return false;
        }
        d_side * origin_side >= 0.0
    };

    same_side(p0, p1, p2, p3)
        && same_side(p1, p2, p3, p0)
        && same_side(p2, p3, p0, p1)
        && same_side(p3, p0, p1, p2)
}

/// Closest point to the origin on the simplex.
///
/// Reduces the simplex to the supporting feature; returns the barycentric
/// weights aligned to the reduced simplex, the closest vector and whether
/// the origin is enclosed.
fn solve_simplex(simplex: &mut Simplex) -> ([f64; 4], Vector3<f64>, bool) {
    match simplex.size {
        1 => {
            let v = simplex.points[0].point.coords;
            ([1.0, 0.0, 0.0, 0.0], v, false)
        }
        2 => {
            let [l0, l1] = closest_on_segment(&simplex.points[0].point, &simplex.points[1].point);
            let v = simplex.points[0].point.coords * l0 + simplex.points[1].point.coords * l1;
            reduce_by_weights(simplex, &[l0, l1]);
            (aligned_weights(&[l0, l1]), v, false)
        }
        3 => {
            let weights = closest_on_triangle(
                &simplex.points[0].point,
                &simplex.points[1].point,
                &simplex.points[2].point,
            );
            let v = simplex.points[0].point.coords * weights[0]
                + simplex.points[1].point.coords * weights[1]
                + simplex.points[2].point.coords * weights[2];
            reduce_by_weights(simplex, &weights);
            (aligned_weights(&weights), v, false)
        }
        4 => {
            let [p0, p1, p2, p3] = [
                simplex.points[0].point,
                simplex.points[1].point,
                simplex.points[2].point,
                simplex.points[3].point,
            ];
            if origin_in_tetrahedron(&p0, &p1, &p2, &p3) {
                return ([0.25; 4], Vector3::zeros(), true);
            }

            // Closest face of the tetrahedron
            let faces: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
            let mut best: Option<([f64; 3], [usize; 3], Vector3<f64>, f64)> = None;
            for face in faces {
                let weights = closest_on_triangle(
                    &simplex.points[face[0]].point,
                    &simplex.points[face[1]].point,
                    &simplex.points[face[2]].point,
                );
                let v = simplex.points[face[0]].point.coords * weights[0]
                    + simplex.points[face[1]].point.coords * weights[1]
                    + simplex.points[face[2]].point.coords * weights[2];
                let dist2 = v.norm_squared();
                if best.as_ref().map_or(true, |(_, _, _, d)| dist2 < *d) {
                    best = Some((weights, face, v, dist2));
                }
            }

            // A tetrahedron always yields at least one non-degenerate face
            let Some((weights, face, v, _)) = best else {
                let v = simplex.points[0].point.coords;
                simplex.reduce(&[0]);
                return ([1.0, 0.0, 0.0, 0.0], v, false);
            };
            let keep: Vec<usize> = face
                .iter()
                .zip(weights.iter())
                .filter(|(_, &w)| w > 0.0)
                .map(|(&i, _)| i)
                .collect();
            let kept_weights: Vec<f64> = weights.iter().copied().filter(|&w| w > 0.0).collect();
            simplex.reduce(&keep);
            let mut aligned = [0.0; 4];
            aligned[..kept_weights.len()].copy_from_slice(&kept_weights);
            (aligned, v, false)
        }
        _ => ([0.0; 4], Vector3::zeros(), false),
    }
}

/// Drop zero-weight points from the simplex.
fn reduce_by_weights(simplex: &mut Simplex, weights: &[f64]) {
    let keep: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    if keep.len() < weights.len() {
        simplex.reduce(&keep);
    }
}

/// Pack the non-zero weights to the front, matching a reduced simplex.
fn aligned_weights(weights: &[f64]) -> [f64; 4] {
    let mut aligned = [0.0; 4];
    let mut slot = 0;
    for &w in weights {
        if w > 0.0 {
            aligned[slot] = w;
            slot += 1;
        }
    }
    aligned
}

/// Witness points on both cores from the simplex barycentric weights.
fn witnesses(simplex: &Simplex, weights: &[f64; 4]) -> (Point3<f64>, Point3<f64>) {
    let mut point_a = Vector3::zeros();
    let mut point_b = Vector3::zeros();
    for (point, &weight) in simplex.points().iter().zip(weights.iter()) {
        point_a += point.support_a.coords * weight;
        point_b += point.support_b.coords * weight;
    }
    (Point3::from(point_a), Point3::from(point_b))
}

// =============================================================================
// GJK distance loop
// =============================================================================

fn gjk(
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> GjkCase {
    let mut direction = transform_b.position - transform_a.position;
    if direction.norm_squared() < EPSILON {
        direction = Vector3::x();
    }

    let mut simplex = Simplex::default();
    simplex.push(support_minkowski(
        shape_a,
        transform_a,
        shape_b,
        transform_b,
        &direction,
    ));

    let mut best: Option<(Point3<f64>, Point3<f64>, f64)> = None;

    for _ in 0..GJK_MAX_ITERATIONS {
        let (weights, v, contains_origin) = solve_simplex(&mut simplex);
        if contains_origin {
            return GjkCase::Overlapping(simplex);
        }

        let dist2 = v.norm_squared();
        if dist2 < EPSILON {
            return GjkCase::Overlapping(simplex);
        }

        let (point_a, point_b) = witnesses(&simplex, &weights);
        best = Some((point_a, point_b, dist2.sqrt()));

        let support = support_minkowski(shape_a, transform_a, shape_b, transform_b, &-v);
        // Converged when the new support cannot get meaningfully closer
        let progress = dist2 - v.dot(&support.point.coords);
        if progress <= GJK_REL_TOLERANCE * dist2 + EPSILON || simplex.contains(&support.point) {
            break;
        }
        simplex.push(support);
    }

    match best {
        Some((point_a, point_b, distance)) => GjkCase::Separated {
            point_a,
            point_b,
            distance,
        },
        None => GjkCase::Overlapping(simplex),
    }
}

// =============================================================================
// EPA
// =============================================================================

/// One triangular face of the expanding polytope.
#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vector3<f64>,
    distance: f64,
}

/// Build a face with an outward (away from the enclosed origin) normal.
fn make_face(vertices: &[MinkowskiPoint], a: usize, b: usize, c: usize) -> Option<Face> {
    let pa = vertices[a].point;
    let pb = vertices[b].point;
    let pc = vertices[c].point;
    let mut normal = (pb - pa).cross(&(pc - pa));
    let norm = normal.norm();
    if norm < EPSILON {
        return None;
    }
    normal /= norm;
    let mut distance = normal.dot(&pa.coords);
    if distance < 0.0 {
        normal = -normal;
        distance = -distance;
    }
    Some(Face {
        indices: [a, b, c],
        normal,
        distance,
    })
}

/// Grow a degenerate simplex into a tetrahedron enclosing volume.
fn blow_up_simplex(
    simplex: &mut Simplex,
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> bool {
    let axes = [
        Vector3::x(),
        -Vector3::x(),
        Vector3::y(),
        -Vector3::y(),
        Vector3::z(),
        -Vector3::z(),
    ];

    // 1 point -> 2 distinct points
    if simplex.size == 1 {
        for axis in &axes {
            let candidate = support_minkowski(shape_a, transform_a, shape_b, transform_b, axis);
            if !simplex.contains(&candidate.point) {
                simplex.push(candidate);
                break;
            }
        }
        if simplex.size < 2 {
            return false;
        }
    }

    // 2 points -> 3 non-collinear points
    if simplex.size == 2 {
        let line = simplex.points[1].point - simplex.points[0].point;
        for axis in &axes {
            let direction = line.cross(axis);
            if direction.norm_squared() < EPSILON {
                continue;
            }
            let candidate =
                support_minkowski(shape_a, transform_a, shape_b, transform_b, &direction);
            let area = (candidate.point - simplex.points[0].point)
                .cross(&line)
                .norm_squared();
            if area > EPSILON && !simplex.contains(&candidate.point) {
                simplex.push(candidate);
                break;
            }
        }
        if simplex.size < 3 {
            return false;
        }
    }

    // 3 points -> 4 points with volume
    if simplex.size == 3 {
        let normal = (simplex.points[1].point - simplex.points[0].point)
            .cross(&(simplex.points[2].point - simplex.points[0].point));
        if normal.norm_squared() < EPSILON {
            return false;
        }
        for direction in [normal, -normal] {
            let candidate =
                support_minkowski(shape_a, transform_a, shape_b, transform_b, &direction);
            let volume = (candidate.point - simplex.points[0].point).dot(&normal);
            if volume.abs() > EPSILON && !simplex.contains(&candidate.point) {
                simplex.push(candidate);
                break;
            }
        }
    }

    simplex.size == 4
}

/// Expand the polytope to the face of minimum distance from the origin.
///
/// Returns the outward unit normal (A toward B), the core penetration depth
/// and the witness points on both cores.
fn epa(
    mut simplex: Simplex,
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> Option<(Vector3<f64>, f64, Point3<f64>, Point3<f64>)> {
    if simplex.size < 4
        && !blow_up_simplex(&mut simplex, shape_a, transform_a, shape_b, transform_b)
    {
        return None;
    }

    let mut vertices: Vec<MinkowskiPoint> = simplex.points().to_vec();
    let mut faces: Vec<Face> = Vec::with_capacity(EPA_MAX_FACES);
    for [a, b, c] in [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]] {
        faces.push(make_face(&vertices, a, b, c)?);
    }

    for _ in 0..EPA_MAX_ITERATIONS {
        let best_index = faces
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
            .map(|(i, _)| i)?;
        let best = faces[best_index];

        let support = support_minkowski(shape_a, transform_a, shape_b, transform_b, &best.normal);
        let gain = best.normal.dot(&support.point.coords) - best.distance;
        if gain < EPA_TOLERANCE || faces.len() + 2 > EPA_MAX_FACES {
            return Some(finish_face(&vertices, &best));
        }

        vertices.push(support);
        let new_index = vertices.len() - 1;

        // Remove faces visible from the new vertex, collecting the horizon
        let mut horizon: Vec<(usize, usize)> = Vec::new();
        let mut kept: Vec<Face> = Vec::with_capacity(faces.len());
        let mut removed_any = false;
        for face in faces {
            let to_support = support.point - vertices[face.indices[0]].point;
            if face.normal.dot(&to_support) > 0.0 {
                removed_any = true;
                for (i, j) in [(0, 1), (1, 2), (2, 0)] {
                    let edge = ordered_edge(face.indices[i], face.indices[j]);
                    if let Some(position) = horizon.iter().position(|&e| e == edge) {
                        horizon.swap_remove(position);
                    } else {
                        horizon.push(edge);
                    }
                }
            } else {
                kept.push(face);
            }
        }

        if !removed_any {
            // The support point does not expand the polytope
            return Some(finish_face(&vertices, &best));
        }

        faces = kept;
        for (a, b) in horizon {
            if let Some(face) = make_face(&vertices, a, b, new_index) {
                faces.push(face);
            }
        }
        if faces.is_empty() {
            return None;
        }
    }

    let best = faces
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))?;
    Some(finish_face(&vertices, best))
}

fn ordered_edge(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Witness points from the barycentric coordinates of the origin's
/// projection onto the closest face.
fn finish_face(
    vertices: &[MinkowskiPoint],
    face: &Face,
) -> (Vector3<f64>, f64, Point3<f64>, Point3<f64>) {
    let a = vertices[face.indices[0]];
    let b = vertices[face.indices[1]];
    let c = vertices[face.indices[2]];

    let projection = face.normal * face.distance;
    let v0 = b.point - a.point;
    let v1 = c.point - a.point;
    let v2 = projection - a.point.coords;

    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;

    let (u, v, w) = if denom.abs() < EPSILON {
        (1.0, 0.0, 0.0)
    } else {
        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        (1.0 - v - w, v, w)
    };

    let point_a =
        Point3::from(a.support_a.coords * u + b.support_a.coords * v + c.support_a.coords * w);
    let point_b =
        Point3::from(a.support_b.coords * u + b.support_b.coords * v + c.support_b.coords * w);

    (face.normal, face.distance, point_a, point_b)
}

// =============================================================================
// Public entry point
// =============================================================================

/// Compute contact information for a convex shape pair, or `None` when the
/// margin surfaces do not touch.
#[must_use]
pub fn contact(
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> Option<GjkEpaContact> {
    let margin_a = shape_a.margin();
    let margin_b = shape_b.margin();
    let total_margin = margin_a + margin_b;

    let simplex = match gjk(shape_a, transform_a, shape_b, transform_b) {
        GjkCase::Separated {
            point_a,
            point_b,
            distance,
        } if distance > 1e-6 => {
            if distance >= total_margin {
                return None;
            }
            let normal = (point_b - point_a) / distance;
            return Some(GjkEpaContact {
                normal,
                penetration: total_margin - distance,
                world_a: point_a + normal * margin_a,
                world_b: point_b - normal * margin_b,
            });
        }
        GjkCase::Separated {
            point_a, point_b, ..
        } => {
            // Touching cores: seed EPA with the witness point
            let mut simplex = Simplex::default();
            simplex.push(MinkowskiPoint {
                point: Point3::from(point_a - point_b),
                support_a: point_a,
                support_b: point_b,
            });
            simplex
        }
        GjkCase::Overlapping(simplex) => simplex,
    };

    let (normal, depth, point_a, point_b) =
        epa(simplex, shape_a, transform_a, shape_b, transform_b)?;
    Some(GjkEpaContact {
        normal,
        penetration: depth + total_margin,
        world_a: point_a + normal * margin_a,
        world_b: point_b - normal * margin_b,
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
    fn test_spheres_apart_have_no_contact() {
        let sphere = Shape::sphere(0.5);
        let result = contact(&sphere, &at(0.0, 0.0, 0.0), &sphere, &at(3.0, 0.0, 0.0));
        assert!(result.is_none());
    }

    #[test]
    fn test_spheres_overlapping() {
        let sphere = Shape::sphere(0.5);
        let result = contact(&sphere, &at(0.0, 0.0, 0.0), &sphere, &at(0.8, 0.0, 0.0))
            .expect("spheres should touch");

        assert_relative_eq!(result.normal.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.penetration, 0.2, epsilon = 1e-9);
        assert_relative_eq!(result.world_a.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(result.world_b.x, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_boxes_core_overlap() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let result = contact(&unit_box, &at(0.0, 0.0, 0.0), &unit_box, &at(0.9, 0.0, 0.0))
            .expect("boxes should touch");

        assert_relative_eq!(result.normal.x, 1.0, epsilon = 1e-6);
        // Cores overlap by 0.1; both margins add 0.04 each
        assert_relative_eq!(result.penetration, 0.18, epsilon = 1e-6);
    }

    #[test]
    fn test_boxes_margin_contact() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        // Declared faces 0.05 apart: only the margins (0.04 + 0.04) touch
        let result = contact(&unit_box, &at(0.0, 0.0, 0.0), &unit_box, &at(1.05, 0.0, 0.0))
            .expect("margins should touch");

        assert_relative_eq!(result.normal.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.penetration, 0.03, epsilon = 1e-9);
        // Witnesses sit on the margin surfaces between the declared faces
        assert!(result.world_a.x > 0.5 && result.world_a.x < 0.56);
        assert!(result.world_b.x > 0.49 && result.world_b.x < 0.56);
    }

    #[test]
    fn test_boxes_beyond_margin_no_contact() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let result = contact(&unit_box, &at(0.0, 0.0, 0.0), &unit_box, &at(1.2, 0.0, 0.0));
        assert!(result.is_none());
    }

    #[test]
    fn test_sphere_above_box() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let sphere = Shape::sphere(0.5);
        let result = contact(&unit_box, &at(0.0, 0.0, 0.0), &sphere, &at(0.0, 0.9, 0.0))
            .expect("sphere rests on box");

        assert_relative_eq!(result.normal.y, 1.0, epsilon = 1e-6);
        // Core gap 0.4, margins 0.04 + 0.5
        assert_relative_eq!(result.penetration, 0.14, epsilon = 1e-6);
        assert_relative_eq!(result.world_b.y, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_flips_with_order() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let sphere = Shape::sphere(0.5);

        let ab = contact(&unit_box, &at(0.0, 0.0, 0.0), &sphere, &at(0.0, 0.9, 0.0))
            .expect("contact");
        let ba = contact(&sphere, &at(0.0, 0.9, 0.0), &unit_box, &at(0.0, 0.0, 0.0))
            .expect("contact");

        assert_relative_eq!(ab.normal.y, -ba.normal.y, epsilon = 1e-6);
        assert_relative_eq!(ab.penetration, ba.penetration, epsilon = 1e-6);
    }

    #[test]
    fn test_cylinder_on_box() {
        let slab = Shape::box_shape(Vector3::new(2.0, 0.5, 2.0));
        let cylinder = Shape::cylinder(0.5, 1.0);
        // Cylinder bottom at y = 0.45, slab top at 0.5: cores overlap
        let result = contact(&slab, &at(0.0, 0.0, 0.0), &cylinder, &at(0.0, 0.95, 0.0))
            .expect("cylinder rests on slab");

        assert_relative_eq!(result.normal.y, 1.0, epsilon = 1e-6);
        assert!(result.penetration > 0.0);
    }

    #[test]
    fn test_deeply_overlapping_boxes_resolve_along_shortest_axis() {
        let unit_box = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let result = contact(&unit_box, &at(0.0, 0.0, 0.0), &unit_box, &at(0.2, 0.0, 0.0))
            .expect("deep overlap");

        // Minimum translation is along X
        assert_relative_eq!(result.normal.x.abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.penetration, 0.8 + 0.08, epsilon = 1e-5);
    }
}
