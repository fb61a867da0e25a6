//! Sequential-impulse constraint solver (projected Gauss-Seidel).
//!
//! Per island and per step the solver builds constraint rows for every
//! contact point and joint, warm-starts them from the impulses accumulated
//! on the previous step, runs a fixed number of velocity iterations, and
//! finishes with a split-impulse position pass that drives penetration and
//! joint drift down through pseudo velocities, leaving the real velocities
//! untouched.
//!
//! Degenerate rows (zero effective mass, singular mass matrices, zero-length
//! tangents) fall back to a no-op or an axis basis; the solver never fails.
//! Iteration order over contacts and joints is their insertion order within
//! the island.

use nalgebra::{Matrix2, Matrix3, Point3, Quaternion, UnitQuaternion, Vector2, Vector3};
use rigid_collision::ManifoldStore;
use rigid_types::JointId;

use crate::island::Island;
use crate::joint::{Joint, JointKind};

/// Relative normal speed below which restitution is ignored (m/s).
pub const RESTITUTION_THRESHOLD: f64 = 1.0;

/// Penetration tolerated without position correction (m).
pub const PENETRATION_SLOP: f64 = 0.005;

/// Baumgarte factor for the position pass.
pub const BAUMGARTE: f64 = 0.2;

/// Effective masses below this are treated as infinite (row skipped).
const MASS_EPSILON: f64 = 1e-10;

/// Solver inputs that vary per step.
#[derive(Debug, Clone, Copy)]
pub struct SolverParams {
    /// Fixed timestep of the current step (seconds).
    pub dt: f64,
    /// Number of velocity iterations.
    pub velocity_iterations: usize,
    /// Number of position (pseudo-velocity) iterations.
    pub position_iterations: usize,
}

/// Per-body view the solver reads and writes, indexed by dense body id.
///
/// Static and sleeping bodies carry zero inverse mass and inertia, which
/// makes every impulse applied to them a no-op.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    /// World position of the center of mass.
    pub position: Point3<f64>,
    /// World orientation.
    pub orientation: UnitQuaternion<f64>,
    /// Linear velocity (solved in place).
    pub linear: Vector3<f64>,
    /// Angular velocity (solved in place).
    pub angular: Vector3<f64>,
    /// Pseudo linear velocity from the position pass.
    pub pseudo_linear: Vector3<f64>,
    /// Pseudo angular velocity from the position pass.
    pub pseudo_angular: Vector3<f64>,
    /// Inverse mass (zero for static or sleeping bodies).
    pub inv_mass: f64,
    /// Inverse inertia tensor in world space.
    pub inv_inertia_world: Matrix3<f64>,
}

impl SolverBody {
    /// A body the solver cannot move.
    #[must_use]
    pub fn fixed(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
            pseudo_linear: Vector3::zeros(),
            pseudo_angular: Vector3::zeros(),
            inv_mass: 0.0,
            inv_inertia_world: Matrix3::zeros(),
        }
    }
}

// =============================================================================
// Shared row math
// =============================================================================

fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Relative velocity of the two anchor points, B minus A.
fn relative_velocity(
    bodies: &[SolverBody],
    a: usize,
    b: usize,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
) -> Vector3<f64> {
    let body_a = &bodies[a];
    let body_b = &bodies[b];
    body_b.linear + body_b.angular.cross(r_b) - body_a.linear - body_a.angular.cross(r_a)
}

/// Relative pseudo velocity of the two anchor points, B minus A.
fn relative_pseudo_velocity(
    bodies: &[SolverBody],
    a: usize,
    b: usize,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
) -> Vector3<f64> {
    let body_a = &bodies[a];
    let body_b = &bodies[b];
    body_b.pseudo_linear + body_b.pseudo_angular.cross(r_b)
        - body_a.pseudo_linear
        - body_a.pseudo_angular.cross(r_a)
}

/// Apply an impulse at the anchors: minus on A, plus on B.
fn apply_impulse(
    bodies: &mut [SolverBody],
    a: usize,
    b: usize,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
    impulse: &Vector3<f64>,
) {
    let (body_a, body_b) = pair_mut(bodies, a, b);
    body_a.linear -= impulse * body_a.inv_mass;
    body_a.angular -= body_a.inv_inertia_world * r_a.cross(impulse);
    body_b.linear += impulse * body_b.inv_mass;
    body_b.angular += body_b.inv_inertia_world * r_b.cross(impulse);
}

/// Apply a pseudo impulse at the anchors: minus on A, plus on B.
fn apply_pseudo_impulse(
    bodies: &mut [SolverBody],
    a: usize,
    b: usize,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
    impulse: &Vector3<f64>,
) {
    let (body_a, body_b) = pair_mut(bodies, a, b);
    body_a.pseudo_linear -= impulse * body_a.inv_mass;
    body_a.pseudo_angular -= body_a.inv_inertia_world * r_a.cross(impulse);
    body_b.pseudo_linear += impulse * body_b.inv_mass;
    body_b.pseudo_angular += body_b.inv_inertia_world * r_b.cross(impulse);
}

/// Apply a pure angular impulse: minus on A, plus on B.
fn apply_angular_impulse(bodies: &mut [SolverBody], a: usize, b: usize, impulse: &Vector3<f64>) {
    let (body_a, body_b) = pair_mut(bodies, a, b);
    body_a.angular -= body_a.inv_inertia_world * impulse;
    body_b.angular += body_b.inv_inertia_world * impulse;
}

/// Apply a pure pseudo angular impulse: minus on A, plus on B.
fn apply_pseudo_angular_impulse(
    bodies: &mut [SolverBody],
    a: usize,
    b: usize,
    impulse: &Vector3<f64>,
) {
    let (body_a, body_b) = pair_mut(bodies, a, b);
    body_a.pseudo_angular -= body_a.inv_inertia_world * impulse;
    body_b.pseudo_angular += body_b.inv_inertia_world * impulse;
}

/// Scalar effective mass of a row along `direction` at the anchors.
fn effective_mass(
    bodies: &[SolverBody],
    a: usize,
    b: usize,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
    direction: &Vector3<f64>,
) -> f64 {
    let body_a = &bodies[a];
    let body_b = &bodies[b];
    let ra_cross = r_a.cross(direction);
    let rb_cross = r_b.cross(direction);
    body_a.inv_mass
        + body_b.inv_mass
        + (body_a.inv_inertia_world * ra_cross).dot(&ra_cross)
        + (body_b.inv_inertia_world * rb_cross).dot(&rb_cross)
}

/// 3x3 mass matrix of a point-to-point constraint.
fn point_mass_matrix(
    bodies: &[SolverBody],
    a: usize,
    b: usize,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
) -> Matrix3<f64> {
    let body_a = &bodies[a];
    let body_b = &bodies[b];
    let skew_a = r_a.cross_matrix();
    let skew_b = r_b.cross_matrix();
    Matrix3::identity() * (body_a.inv_mass + body_b.inv_mass)
        - skew_a * body_a.inv_inertia_world * skew_a
        - skew_b * body_b.inv_inertia_world * skew_b
}

/// An orthonormal basis perpendicular to a unit vector.
fn orthonormal_basis(normal: &Vector3<f64>) -> [Vector3<f64>; 2] {
    let helper = if normal.x.abs() > 0.9 {
        Vector3::y()
    } else {
        Vector3::x()
    };
    let t1 = normal.cross(&helper).normalize();
    let t2 = normal.cross(&t1);
    [t1, t2]
}

// =============================================================================
// Contact constraints
// =============================================================================

/// One prepared contact row set (normal plus two tangents).
#[derive(Debug, Clone, Copy)]
struct ContactRow {
    point_index: usize,
    r_a: Vector3<f64>,
    r_b: Vector3<f64>,
    normal: Vector3<f64>,
    tangent: [Vector3<f64>; 2],
    normal_mass: f64,
    tangent_mass: [f64; 2],
    restitution_bias: f64,
    penetration: f64,
    normal_impulse: f64,
    tangent_impulse: [f64; 2],
    pseudo_impulse: f64,
}

/// All rows of one manifold.
#[derive(Debug, Clone)]
struct ContactConstraint {
    manifold: usize,
    a: usize,
    b: usize,
    friction: f64,
    rows: Vec<ContactRow>,
}

fn prepare_contacts(
    island: &Island,
    bodies: &[SolverBody],
    manifolds: &ManifoldStore,
) -> Vec<ContactConstraint> {
    let mut constraints = Vec::with_capacity(island.manifolds.len());

    for &handle in &island.manifolds {
        let Some(manifold) = manifolds.get(handle) else {
            continue;
        };
        let a = manifold.body_a.index();
        let b = manifold.body_b.index();
        let restitution = manifold.material.restitution;
        let friction = manifold.material.friction;

        let mut rows = Vec::with_capacity(manifold.points().len());
        for (point_index, point) in manifold.points().iter().enumerate() {
            let r_a = point.world_a - bodies[a].position;
            let r_b = point.world_b - bodies[b].position;
            let normal = point.normal;

            let normal_k = effective_mass(bodies, a, b, &r_a, &r_b, &normal);
            if normal_k < MASS_EPSILON {
                continue;
            }

            // Friction basis: along the tangential relative velocity when
            // there is one, otherwise any orthonormal pair
            let v_rel = relative_velocity(bodies, a, b, &r_a, &r_b);
            let vn = v_rel.dot(&normal);
            let tangential = v_rel - normal * vn;
            let tangent = if tangential.norm_squared() > 1e-12 {
                let t1 = tangential.normalize();
                [t1, normal.cross(&t1)]
            } else {
                orthonormal_basis(&normal)
            };

            let tangent_mass = [
                effective_mass(bodies, a, b, &r_a, &r_b, &tangent[0]),
                effective_mass(bodies, a, b, &r_a, &r_b, &tangent[1]),
            ];

            let restitution_bias = if vn < -RESTITUTION_THRESHOLD {
                -restitution * vn
            } else {
                0.0
            };

            rows.push(ContactRow {
                point_index,
                r_a,
                r_b,
                normal,
                tangent,
                normal_mass: 1.0 / normal_k,
                tangent_mass: [
                    if tangent_mass[0] > MASS_EPSILON {
                        1.0 / tangent_mass[0]
                    } else {
                        0.0
                    },
                    if tangent_mass[1] > MASS_EPSILON {
                        1.0 / tangent_mass[1]
                    } else {
                        0.0
                    },
                ],
                restitution_bias,
                penetration: point.penetration,
                normal_impulse: point.normal_impulse,
                tangent_impulse: point.tangent_impulse,
                pseudo_impulse: 0.0,
            });
        }

        constraints.push(ContactConstraint {
            manifold: handle,
            a,
            b,
            friction,
            rows,
        });
    }

    constraints
}

fn warm_start_contacts(constraints: &mut [ContactConstraint], bodies: &mut [SolverBody]) {
    for constraint in constraints {
        for row in &constraint.rows {
            let impulse = row.normal * row.normal_impulse
                + row.tangent[0] * row.tangent_impulse[0]
                + row.tangent[1] * row.tangent_impulse[1];
            apply_impulse(
                bodies,
                constraint.a,
                constraint.b,
                &row.r_a,
                &row.r_b,
                &impulse,
            );
        }
    }
}

fn solve_contact_velocity(constraints: &mut [ContactConstraint], bodies: &mut [SolverBody]) {
    for constraint in constraints {
        for row in &mut constraint.rows {
            // Normal row with accumulated clamp at zero
            let v_rel = relative_velocity(bodies, constraint.a, constraint.b, &row.r_a, &row.r_b);
            let vn = v_rel.dot(&row.normal);
            let lambda = row.normal_mass * (-vn + row.restitution_bias);
            let new_impulse = (row.normal_impulse + lambda).max(0.0);
            let delta = new_impulse - row.normal_impulse;
            row.normal_impulse = new_impulse;
            apply_impulse(
                bodies,
                constraint.a,
                constraint.b,
                &row.r_a,
                &row.r_b,
                &(row.normal * delta),
            );

            // Coulomb friction: each tangent clamped to the cone
            let max_friction = constraint.friction * row.normal_impulse;
            for i in 0..2 {
                if row.tangent_mass[i] == 0.0 {
                    continue;
                }
                let v_rel =
                    relative_velocity(bodies, constraint.a, constraint.b, &row.r_a, &row.r_b);
                let vt = v_rel.dot(&row.tangent[i]);
                let lambda = -row.tangent_mass[i] * vt;
                let new_impulse =
                    (row.tangent_impulse[i] + lambda).clamp(-max_friction, max_friction);
                let delta = new_impulse - row.tangent_impulse[i];
                row.tangent_impulse[i] = new_impulse;
                apply_impulse(
                    bodies,
                    constraint.a,
                    constraint.b,
                    &row.r_a,
                    &row.r_b,
                    &(row.tangent[i] * delta),
                );
            }
        }
    }
}

fn solve_contact_position(
    constraints: &mut [ContactConstraint],
    bodies: &mut [SolverBody],
    dt: f64,
) {
    for constraint in constraints {
        for row in &mut constraint.rows {
            let bias = BAUMGARTE / dt * (row.penetration - PENETRATION_SLOP).max(0.0);
            if bias == 0.0 && row.pseudo_impulse == 0.0 {
                continue;
            }
            let v_pseudo =
                relative_pseudo_velocity(bodies, constraint.a, constraint.b, &row.r_a, &row.r_b);
            let vn = v_pseudo.dot(&row.normal);
            let lambda = row.normal_mass * (bias - vn);
            let new_impulse = (row.pseudo_impulse + lambda).max(0.0);
            let delta = new_impulse - row.pseudo_impulse;
            row.pseudo_impulse = new_impulse;
            apply_pseudo_impulse(
                bodies,
                constraint.a,
                constraint.b,
                &row.r_a,
                &row.r_b,
                &(row.normal * delta),
            );
        }
    }
}

/// Store the accumulated impulses back into the manifolds for warm starting
/// the next step.
fn store_contact_impulses(constraints: &[ContactConstraint], manifolds: &mut ManifoldStore) {
    for constraint in constraints {
        let Some(manifold) = manifolds.get_mut(constraint.manifold) else {
            continue;
        };
        let points = manifold.points_mut();
        for row in &constraint.rows {
            if let Some(point) = points.get_mut(row.point_index) {
                point.normal_impulse = row.normal_impulse;
                point.tangent_impulse = row.tangent_impulse;
                point.tangent = row.tangent;
            }
        }
    }
}

// =============================================================================
// Joint constraints
// =============================================================================

/// Optional limit row shared by hinge (angular) and slider (linear).
#[derive(Debug, Clone, Copy)]
struct LimitRow {
    /// Current constraint position (angle or translation).
    position: f64,
    lower: f64,
    upper: f64,
    mass: f64,
    impulse: f64,
}

#[derive(Debug, Clone)]
struct JointConstraint {
    joint_id: JointId,
    a: usize,
    b: usize,
    r_a: Vector3<f64>,
    r_b: Vector3<f64>,
    /// Inverse mass matrix of the point part; zero matrix when singular.
    inv_k_point: Matrix3<f64>,
    /// Anchor error at the start of the step, B minus A.
    point_error: Vector3<f64>,
    point_impulse: Vector3<f64>,
    part: JointPart,
}

#[derive(Debug, Clone)]
enum JointPart {
    BallSocket,
    Hinge {
        axis: Vector3<f64>,
        basis: [Vector3<f64>; 2],
        inv_k_axis: Matrix2<f64>,
        /// Axis misalignment error projected on the basis.
        axis_error: Vector2<f64>,
        axis_impulse: Vector2<f64>,
        limit: Option<LimitRow>,
    },
    Slider {
        axis: Vector3<f64>,
        basis: [Vector3<f64>; 2],
        perp_mass: [f64; 2],
        perp_error: [f64; 2],
        perp_impulse: [f64; 2],
        inv_k_angular: Matrix3<f64>,
        angular_error: Vector3<f64>,
        angular_impulse: Vector3<f64>,
        limit: Option<LimitRow>,
    },
    Fixed {
        inv_k_angular: Matrix3<f64>,
        angular_error: Vector3<f64>,
        angular_impulse: Vector3<f64>,
    },
}

/// Inverse of the summed world inverse-inertia tensors, or zero.
fn angular_mass_matrix(bodies: &[SolverBody], a: usize, b: usize) -> Matrix3<f64> {
    let k = bodies[a].inv_inertia_world + bodies[b].inv_inertia_world;
    k.try_inverse().unwrap_or_else(Matrix3::zeros)
}

/// Orientation drift of B relative to its pose implied by A and the
/// reference rotation, as a rotation vector.
fn orientation_error(
    bodies: &[SolverBody],
    a: usize,
    b: usize,
    reference_rotation: &UnitQuaternion<f64>,
) -> Vector3<f64> {
    let desired = bodies[a].orientation * reference_rotation;
    (bodies[b].orientation * desired.inverse()).scaled_axis()
}

/// Signed twist of the relative rotation about `axis` (body A local).
fn twist_angle(
    bodies: &[SolverBody],
    a: usize,
    b: usize,
    reference_rotation: &UnitQuaternion<f64>,
    local_axis: &Vector3<f64>,
) -> f64 {
    let relative = bodies[a].orientation.inverse() * bodies[b].orientation;
    let delta: Quaternion<f64> = (reference_rotation.inverse() * relative).into_inner();
    let projection = delta.imag().dot(local_axis);
    2.0 * projection.atan2(delta.scalar())
}

fn prepare_joint(joint: &Joint, bodies: &[SolverBody]) -> JointConstraint {
    let a = joint.body_a.index();
    let b = joint.body_b.index();

    let r_a = bodies[a].orientation * joint.local_anchor_a.coords;
    let r_b = bodies[b].orientation * joint.local_anchor_b.coords;
    let anchor_a = bodies[a].position + r_a;
    let anchor_b = bodies[b].position + r_b;
    let point_error = anchor_b - anchor_a;

    let inv_k_point = point_mass_matrix(bodies, a, b, &r_a, &r_b)
        .try_inverse()
        .unwrap_or_else(Matrix3::zeros);

    let part = match &joint.kind {
        JointKind::BallSocket { .. } => JointPart::BallSocket,
        JointKind::Hinge {
            local_axis_a,
            local_axis_b,
            reference_rotation,
            limits,
            axis_impulse,
            limit_impulse,
            ..
        } => {
            let axis = (bodies[a].orientation * local_axis_a).normalize();
            let basis = orthonormal_basis(&axis);
            let axis_b_world = bodies[b].orientation * local_axis_b;
            let misalignment = axis.cross(&axis_b_world);

            let inertia_sum = bodies[a].inv_inertia_world + bodies[b].inv_inertia_world;
            let k_axis = Matrix2::new(
                basis[0].dot(&(inertia_sum * basis[0])),
                basis[0].dot(&(inertia_sum * basis[1])),
                basis[1].dot(&(inertia_sum * basis[0])),
                basis[1].dot(&(inertia_sum * basis[1])),
            );
            let axis_row_k = axis.dot(&(inertia_sum * axis));

            let limit = limits.and_then(|(lower, upper)| {
                if axis_row_k < MASS_EPSILON {
                    return None;
                }
                Some(LimitRow {
                    position: twist_angle(bodies, a, b, reference_rotation, local_axis_a),
                    lower,
                    upper,
                    mass: 1.0 / axis_row_k,
                    impulse: *limit_impulse,
                })
            });

            JointPart::Hinge {
                axis,
                basis,
                inv_k_axis: k_axis.try_inverse().unwrap_or_else(Matrix2::zeros),
                axis_error: Vector2::new(misalignment.dot(&basis[0]), misalignment.dot(&basis[1])),
                axis_impulse: Vector2::new(axis_impulse[0], axis_impulse[1]),
                limit,
            }
        }
        JointKind::Slider {
            local_axis_a,
            reference_rotation,
            limits,
            perp_impulse,
            angular_impulse,
            limit_impulse,
        } => {
            let axis = (bodies[a].orientation * local_axis_a).normalize();
            let basis = orthonormal_basis(&axis);
            let translation = point_error.dot(&axis);

            let perp_k = [
                effective_mass(bodies, a, b, &r_a, &r_b, &basis[0]),
                effective_mass(bodies, a, b, &r_a, &r_b, &basis[1]),
            ];
            let axis_row_k = effective_mass(bodies, a, b, &r_a, &r_b, &axis);

            let limit = limits.and_then(|(lower, upper)| {
                if axis_row_k < MASS_EPSILON {
                    return None;
                }
                Some(LimitRow {
                    position: translation,
                    lower,
                    upper,
                    mass: 1.0 / axis_row_k,
                    impulse: *limit_impulse,
                })
            });

            JointPart::Slider {
                axis,
                basis,
                perp_mass: [
                    if perp_k[0] > MASS_EPSILON {
                        1.0 / perp_k[0]
                    } else {
                        0.0
                    },
                    if perp_k[1] > MASS_EPSILON {
                        1.0 / perp_k[1]
                    } else {
                        0.0
                    },
                ],
                perp_error: [point_error.dot(&basis[0]), point_error.dot(&basis[1])],
                perp_impulse: *perp_impulse,
                inv_k_angular: angular_mass_matrix(bodies, a, b),
                angular_error: orientation_error(bodies, a, b, reference_rotation),
                angular_impulse: *angular_impulse,
                limit,
            }
        }
        JointKind::Fixed {
            reference_rotation,
            angular_impulse,
            ..
        } => JointPart::Fixed {
            inv_k_angular: angular_mass_matrix(bodies, a, b),
            angular_error: orientation_error(bodies, a, b, reference_rotation),
            angular_impulse: *angular_impulse,
        },
    };

    let point_impulse = match &joint.kind {
        JointKind::BallSocket { impulse }
        | JointKind::Hinge { impulse, .. }
        | JointKind::Fixed { impulse, .. } => *impulse,
        JointKind::Slider { .. } => Vector3::zeros(),
    };

    JointConstraint {
        joint_id: joint.id,
        a,
        b,
        r_a,
        r_b,
        inv_k_point,
        point_error,
        point_impulse,
        part,
    }
}

fn warm_start_joint(constraint: &JointConstraint, bodies: &mut [SolverBody]) {
    let (a, b) = (constraint.a, constraint.b);
    match &constraint.part {
        JointPart::BallSocket => {
            apply_impulse(
                bodies,
                a,
                b,
                &constraint.r_a,
                &constraint.r_b,
                &constraint.point_impulse,
            );
        }
        JointPart::Hinge {
            basis,
            axis,
            axis_impulse,
            limit,
            ..
        } => {
            apply_impulse(
                bodies,
                a,
                b,
                &constraint.r_a,
                &constraint.r_b,
                &constraint.point_impulse,
            );
            let mut angular = basis[0] * axis_impulse.x + basis[1] * axis_impulse.y;
            if let Some(limit) = limit {
                angular += axis * limit.impulse;
            }
            apply_angular_impulse(bodies, a, b, &angular);
        }
        JointPart::Slider {
            axis,
            basis,
            perp_impulse,
            angular_impulse,
            limit,
            ..
        } => {
            let mut linear = basis[0] * perp_impulse[0] + basis[1] * perp_impulse[1];
            if let Some(limit) = limit {
                linear += axis * limit.impulse;
            }
            apply_impulse(bodies, a, b, &constraint.r_a, &constraint.r_b, &linear);
            apply_angular_impulse(bodies, a, b, angular_impulse);
        }
        JointPart::Fixed {
            angular_impulse, ..
        } => {
            apply_impulse(
                bodies,
                a,
                b,
                &constraint.r_a,
                &constraint.r_b,
                &constraint.point_impulse,
            );
            apply_angular_impulse(bodies, a, b, angular_impulse);
        }
    }
}

/// Solve a limit row at velocity level: lower limits push up (impulse >= 0),
/// upper limits push down (impulse <= 0).
fn solve_limit_row(limit: &mut LimitRow, speed: f64, dt: f64) -> f64 {
    if limit.position <= limit.lower {
        let bias = BAUMGARTE / dt * (limit.position - limit.lower).min(0.0);
        let lambda = -limit.mass * (speed + bias);
        let new_impulse = (limit.impulse + lambda).max(0.0);
        let delta = new_impulse - limit.impulse;
        limit.impulse = new_impulse;
        delta
    } else if limit.position >= limit.upper {
        let bias = BAUMGARTE / dt * (limit.position - limit.upper).max(0.0);
        let lambda = -limit.mass * (speed + bias);
        let new_impulse = (limit.impulse + lambda).min(0.0);
        let delta = new_impulse - limit.impulse;
        limit.impulse = new_impulse;
        delta
    } else {
        let delta = -limit.impulse;
        limit.impulse = 0.0;
        delta
    }
}

fn solve_joint_velocity(constraint: &mut JointConstraint, bodies: &mut [SolverBody], dt: f64) {
    let (a, b) = (constraint.a, constraint.b);

    // Point-to-point part (every kind except the slider)
    if !matches!(constraint.part, JointPart::Slider { .. }) {
        let jv = relative_velocity(bodies, a, b, &constraint.r_a, &constraint.r_b);
        let lambda = constraint.inv_k_point * (-jv);
        constraint.point_impulse += lambda;
        apply_impulse(bodies, a, b, &constraint.r_a, &constraint.r_b, &lambda);
    }

    match &mut constraint.part {
        JointPart::BallSocket => {}
        JointPart::Hinge {
            axis,
            basis,
            inv_k_axis,
            axis_impulse,
            limit,
            ..
        } => {
            // Keep the two axes aligned: kill relative spin off-axis
            let relative_spin = bodies[b].angular - bodies[a].angular;
            let jv = Vector2::new(relative_spin.dot(&basis[0]), relative_spin.dot(&basis[1]));
            let lambda = *inv_k_axis * (-jv);
            *axis_impulse += lambda;
            apply_angular_impulse(bodies, a, b, &(basis[0] * lambda.x + basis[1] * lambda.y));

            if let Some(limit) = limit {
                let spin = (bodies[b].angular - bodies[a].angular).dot(axis);
                let delta = solve_limit_row(limit, spin, dt);
                if delta != 0.0 {
                    apply_angular_impulse(bodies, a, b, &(*axis * delta));
                }
            }
        }
        JointPart::Slider {
            axis,
            basis,
            perp_mass,
            perp_impulse,
            inv_k_angular,
            angular_impulse,
            limit,
            ..
        } => {
            // Lock translation perpendicular to the axis
            for i in 0..2 {
                if perp_mass[i] == 0.0 {
                    continue;
                }
                let jv = relative_velocity(bodies, a, b, &constraint.r_a, &constraint.r_b)
                    .dot(&basis[i]);
                let lambda = -perp_mass[i] * jv;
                perp_impulse[i] += lambda;
                apply_impulse(
                    bodies,
                    a,
                    b,
                    &constraint.r_a,
                    &constraint.r_b,
                    &(basis[i] * lambda),
                );
            }

            // Lock all relative rotation
            let relative_spin = bodies[b].angular - bodies[a].angular;
            let lambda = *inv_k_angular * (-relative_spin);
            *angular_impulse += lambda;
            apply_angular_impulse(bodies, a, b, &lambda);

            if let Some(limit) = limit {
                let speed = relative_velocity(bodies, a, b, &constraint.r_a, &constraint.r_b)
                    .dot(axis);
                let delta = solve_limit_row(limit, speed, dt);
                if delta != 0.0 {
                    let impulse = *axis * delta;
                    apply_impulse(bodies, a, b, &constraint.r_a, &constraint.r_b, &impulse);
                }
            }
        }
        JointPart::Fixed {
            inv_k_angular,
            angular_impulse,
            ..
        } => {
            let relative_spin = bodies[b].angular - bodies[a].angular;
            let lambda = *inv_k_angular * (-relative_spin);
            *angular_impulse += lambda;
            apply_angular_impulse(bodies, a, b, &lambda);
        }
    }
}

fn solve_joint_position(constraint: &mut JointConstraint, bodies: &mut [SolverBody], dt: f64) {
    let (a, b) = (constraint.a, constraint.b);
    let beta_dt = BAUMGARTE / dt;

    if !matches!(constraint.part, JointPart::Slider { .. }) {
        let jv = relative_pseudo_velocity(bodies, a, b, &constraint.r_a, &constraint.r_b);
        let lambda = constraint.inv_k_point * (-jv - constraint.point_error * beta_dt);
        apply_pseudo_impulse(bodies, a, b, &constraint.r_a, &constraint.r_b, &lambda);
    }

    match &constraint.part {
        JointPart::BallSocket => {}
        JointPart::Hinge {
            basis,
            inv_k_axis,
            axis_error,
            ..
        } => {
            let relative_spin = bodies[b].pseudo_angular - bodies[a].pseudo_angular;
            let jv = Vector2::new(relative_spin.dot(&basis[0]), relative_spin.dot(&basis[1]));
            // Drive the axis misalignment down alongside the spin
            let lambda = *inv_k_axis * (-jv - axis_error * beta_dt);
            apply_pseudo_angular_impulse(
                bodies,
                a,
                b,
                &(basis[0] * lambda.x + basis[1] * lambda.y),
            );
        }
        JointPart::Slider {
            basis,
            perp_mass,
            perp_error,
            inv_k_angular,
            angular_error,
            ..
        } => {
            for i in 0..2 {
                if perp_mass[i] == 0.0 {
                    continue;
                }
                let jv = relative_pseudo_velocity(bodies, a, b, &constraint.r_a, &constraint.r_b)
                    .dot(&basis[i]);
                let lambda = -perp_mass[i] * (jv + perp_error[i] * beta_dt);
                apply_pseudo_impulse(
                    bodies,
                    a,
                    b,
                    &constraint.r_a,
                    &constraint.r_b,
                    &(basis[i] * lambda),
                );
            }
            let relative_spin = bodies[b].pseudo_angular - bodies[a].pseudo_angular;
            let lambda = *inv_k_angular * (-relative_spin - angular_error * beta_dt);
            apply_pseudo_angular_impulse(bodies, a, b, &lambda);
        }
        JointPart::Fixed {
            inv_k_angular,
            angular_error,
            ..
        } => {
            let relative_spin = bodies[b].pseudo_angular - bodies[a].pseudo_angular;
            let lambda = *inv_k_angular * (-relative_spin - angular_error * beta_dt);
            apply_pseudo_angular_impulse(bodies, a, b, &lambda);
        }
    }
}

/// Store the accumulated joint multipliers back for the next step.
fn store_joint_impulses(constraints: &[JointConstraint], joints: &mut [Option<Joint>]) {
    for constraint in constraints {
        let Some(joint) = joints
            .get_mut(constraint.joint_id.index())
            .and_then(Option::as_mut)
        else {
            continue;
        };
        match (&mut joint.kind, &constraint.part) {
            (JointKind::BallSocket { impulse }, JointPart::BallSocket) => {
                *impulse = constraint.point_impulse;
            }
            (
                JointKind::Hinge {
                    impulse,
                    axis_impulse,
                    limit_impulse,
                    ..
                },
                JointPart::Hinge {
                    axis_impulse: solved_axis,
                    limit,
                    ..
                },
            ) => {
                *impulse = constraint.point_impulse;
                *axis_impulse = [solved_axis.x, solved_axis.y];
                *limit_impulse = limit.as_ref().map_or(0.0, |l| l.impulse);
            }
            (
                JointKind::Slider {
                    perp_impulse,
                    angular_impulse,
                    limit_impulse,
                    ..
                },
                JointPart::Slider {
                    perp_impulse: solved_perp,
                    angular_impulse: solved_angular,
                    limit,
                    ..
                },
            ) => {
                *perp_impulse = *solved_perp;
                *angular_impulse = *solved_angular;
                *limit_impulse = limit.as_ref().map_or(0.0, |l| l.impulse);
            }
            (
                JointKind::Fixed {
                    impulse,
                    angular_impulse,
                    ..
                },
                JointPart::Fixed {
                    angular_impulse: solved_angular,
                    ..
                },
            ) => {
                *impulse = constraint.point_impulse;
                *angular_impulse = *solved_angular;
            }
            _ => {}
        }
    }
}

// =============================================================================
// Island entry point
// =============================================================================

/// Solve one island: warm start, velocity iterations, position pass.
///
/// Velocities and pseudo velocities are written into `bodies`; accumulated
/// impulses are written back into the manifolds and joints.
pub fn solve_island(
    island: &Island,
    bodies: &mut [SolverBody],
    manifolds: &mut ManifoldStore,
    joints: &mut [Option<Joint>],
    params: &SolverParams,
) {
    let mut joint_constraints: Vec<JointConstraint> = island
        .joints
        .iter()
        .filter_map(|id| {
            joints
                .get(id.index())
                .and_then(Option::as_ref)
                .map(|joint| prepare_joint(joint, bodies))
        })
        .collect();
    let mut contact_constraints = prepare_contacts(island, bodies, manifolds);

    for constraint in &joint_constraints {
        warm_start_joint(constraint, bodies);
    }
    warm_start_contacts(&mut contact_constraints, bodies);

    for _ in 0..params.velocity_iterations {
        for constraint in &mut joint_constraints {
            solve_joint_velocity(constraint, bodies, params.dt);
        }
        solve_contact_velocity(&mut contact_constraints, bodies);
    }

    store_contact_impulses(&contact_constraints, manifolds);
    store_joint_impulses(&joint_constraints, joints);

    for _ in 0..params.position_iterations {
        for constraint in &mut joint_constraints {
            solve_joint_position(constraint, bodies, params.dt);
        }
        solve_contact_position(&mut contact_constraints, bodies, params.dt);
    }
}
