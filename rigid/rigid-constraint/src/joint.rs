//! Joint constraints between body pairs.
//!
//! Four kinds are supported: ball-socket (3 constrained DOF), hinge (5),
//! slider (5) and fixed (6). Each kind stores its anchors and axes in the
//! bodies' local frames plus the accumulated Lagrange multipliers of the
//! previous solve, which warm-start the next one.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rigid_types::{BodyId, JointId, Transform};

/// Descriptor used to create a joint; anchors and axes are given in world
/// space and converted to the bodies' local frames at creation time.
#[derive(Debug, Clone, Copy)]
pub enum JointDesc {
    /// Ball-and-socket: the two local anchors must coincide.
    BallSocket {
        /// First body.
        body_a: BodyId,
        /// Second body.
        body_b: BodyId,
        /// Common anchor in world space.
        anchor: Point3<f64>,
    },
    /// Hinge: anchors coincide and rotation is free only about the axis.
    Hinge {
        /// First body.
        body_a: BodyId,
        /// Second body.
        body_b: BodyId,
        /// Common anchor in world space.
        anchor: Point3<f64>,
        /// Hinge axis in world space (normalized at creation).
        axis: Vector3<f64>,
        /// Optional (lower, upper) rotation limits in radians.
        limits: Option<(f64, f64)>,
    },
    /// Slider: translation is free only along the axis, rotation is locked.
    Slider {
        /// First body.
        body_a: BodyId,
        /// Second body.
        body_b: BodyId,
        /// Common anchor in world space.
        anchor: Point3<f64>,
        /// Slide axis in world space (normalized at creation).
        axis: Vector3<f64>,
        /// Optional (lower, upper) translation limits in meters.
        limits: Option<(f64, f64)>,
    },
    /// Fixed: the two bodies move as one.
    Fixed {
        /// First body.
        body_a: BodyId,
        /// Second body.
        body_b: BodyId,
        /// Reference point in world space.
        anchor: Point3<f64>,
    },
}

impl JointDesc {
    /// The first body of the pair.
    #[must_use]
    pub fn body_a(&self) -> BodyId {
        match self {
            Self::BallSocket { body_a, .. }
            | Self::Hinge { body_a, .. }
            | Self::Slider { body_a, .. }
            | Self::Fixed { body_a, .. } => *body_a,
        }
    }

    /// The second body of the pair.
    #[must_use]
    pub fn body_b(&self) -> BodyId {
        match self {
            Self::BallSocket { body_b, .. }
            | Self::Hinge { body_b, .. }
            | Self::Slider { body_b, .. }
            | Self::Fixed { body_b, .. } => *body_b,
        }
    }
}

/// Kind-specific joint state.
#[derive(Debug, Clone)]
pub enum JointKind {
    /// Ball-and-socket.
    BallSocket {
        /// Accumulated point impulse (warm start).
        impulse: Vector3<f64>,
    },
    /// Hinge about one axis.
    Hinge {
        /// Hinge axis in body A's local frame.
        local_axis_a: Vector3<f64>,
        /// Hinge axis in body B's local frame.
        local_axis_b: Vector3<f64>,
        /// Relative orientation at creation, `qa0⁻¹ * qb0`.
        reference_rotation: UnitQuaternion<f64>,
        /// Optional (lower, upper) angle limits in radians.
        limits: Option<(f64, f64)>,
        /// Accumulated point impulse.
        impulse: Vector3<f64>,
        /// Accumulated axis-alignment impulses along the two normals.
        axis_impulse: [f64; 2],
        /// Accumulated limit impulse about the axis.
        limit_impulse: f64,
    },
    /// Slider along one axis.
    Slider {
        /// Slide axis in body A's local frame.
        local_axis_a: Vector3<f64>,
        /// Relative orientation at creation, `qa0⁻¹ * qb0`.
        reference_rotation: UnitQuaternion<f64>,
        /// Optional (lower, upper) translation limits in meters.
        limits: Option<(f64, f64)>,
        /// Accumulated translation impulses perpendicular to the axis.
        perp_impulse: [f64; 2],
        /// Accumulated angular lock impulse.
        angular_impulse: Vector3<f64>,
        /// Accumulated limit impulse along the axis.
        limit_impulse: f64,
    },
    /// Rigid connection.
    Fixed {
        /// Relative orientation at creation, `qa0⁻¹ * qb0`.
        reference_rotation: UnitQuaternion<f64>,
        /// Accumulated point impulse.
        impulse: Vector3<f64>,
        /// Accumulated angular lock impulse.
        angular_impulse: Vector3<f64>,
    },
}

/// A constraint between two bodies.
#[derive(Debug, Clone)]
pub struct Joint {
    /// The joint's id within its world.
    pub id: JointId,
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A's local frame.
    pub local_anchor_a: Point3<f64>,
    /// Anchor in body B's local frame.
    pub local_anchor_b: Point3<f64>,
    /// Kind-specific state.
    pub kind: JointKind,
}

impl Joint {
    /// Build a joint from a descriptor and the bodies' current transforms.
    #[must_use]
    pub fn from_desc(
        id: JointId,
        desc: &JointDesc,
        transform_a: &Transform,
        transform_b: &Transform,
    ) -> Self {
        let reference_rotation = transform_a.orientation.inverse() * transform_b.orientation;
        match *desc {
            JointDesc::BallSocket {
                body_a,
                body_b,
                anchor,
            } => Self {
                id,
                body_a,
                body_b,
                local_anchor_a: transform_a.inverse_transform_point(&anchor),
                local_anchor_b: transform_b.inverse_transform_point(&anchor),
                kind: JointKind::BallSocket {
                    impulse: Vector3::zeros(),
                },
            },
            JointDesc::Hinge {
                body_a,
                body_b,
                anchor,
                axis,
                limits,
            } => {
                let axis = axis.normalize();
                Self {
                    id,
                    body_a,
                    body_b,
                    local_anchor_a: transform_a.inverse_transform_point(&anchor),
                    local_anchor_b: transform_b.inverse_transform_point(&anchor),
                    kind: JointKind::Hinge {
                        local_axis_a: transform_a.inverse_transform_vector(&axis),
                        local_axis_b: transform_b.inverse_transform_vector(&axis),
                        reference_rotation,
                        limits,
                        impulse: Vector3::zeros(),
                        axis_impulse: [0.0; 2],
                        limit_impulse: 0.0,
                    },
                }
            }
            JointDesc::Slider {
                body_a,
                body_b,
                anchor,
                axis,
                limits,
            } => {
                let axis = axis.normalize();
                Self {
                    id,
                    body_a,
                    body_b,
                    local_anchor_a: transform_a.inverse_transform_point(&anchor),
                    local_anchor_b: transform_b.inverse_transform_point(&anchor),
                    kind: JointKind::Slider {
                        local_axis_a: transform_a.inverse_transform_vector(&axis),
                        reference_rotation,
                        limits,
                        perp_impulse: [0.0; 2],
                        angular_impulse: Vector3::zeros(),
                        limit_impulse: 0.0,
                    },
                }
            }
            JointDesc::Fixed {
                body_a,
                body_b,
                anchor,
            } => Self {
                id,
                body_a,
                body_b,
                local_anchor_a: transform_a.inverse_transform_point(&anchor),
                local_anchor_b: transform_b.inverse_transform_point(&anchor),
                kind: JointKind::Fixed {
                    reference_rotation,
                    impulse: Vector3::zeros(),
                    angular_impulse: Vector3::zeros(),
                },
            },
        }
    }

    /// Reset the accumulated multipliers (e.g. after teleporting a body).
    pub fn reset_warm_start(&mut self) {
        match &mut self.kind {
            JointKind::BallSocket { impulse } => *impulse = Vector3::zeros(),
            JointKind::Hinge {
                impulse,
                axis_impulse,
                limit_impulse,
                ..
            } => {
                *impulse = Vector3::zeros();
                *axis_impulse = [0.0; 2];
                *limit_impulse = 0.0;
            }
            JointKind::Slider {
                perp_impulse,
                angular_impulse,
                limit_impulse,
                ..
            } => {
                *perp_impulse = [0.0; 2];
                *angular_impulse = Vector3::zeros();
                *limit_impulse = 0.0;
            }
            JointKind::Fixed {
                impulse,
                angular_impulse,
                ..
            } => {
                *impulse = Vector3::zeros();
                *angular_impulse = Vector3::zeros();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_ball_socket_local_anchors() {
        let transform_a = Transform::from_position(Point3::new(0.0, 1.0, 0.0));
        let transform_b = Transform::from_position(Point3::new(0.0, -1.0, 0.0));
        let desc = JointDesc::BallSocket {
            body_a: BodyId::new(0),
            body_b: BodyId::new(1),
            anchor: Point3::new(0.0, 0.0, 0.0),
        };

        let joint = Joint::from_desc(JointId::new(0), &desc, &transform_a, &transform_b);
        assert_eq!(joint.local_anchor_a, Point3::new(0.0, -1.0, 0.0));
        assert_eq!(joint.local_anchor_b, Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_hinge_axis_is_normalized() {
        let identity = Transform::identity();
        let desc = JointDesc::Hinge {
            body_a: BodyId::new(0),
            body_b: BodyId::new(1),
            anchor: Point3::origin(),
            axis: Vector3::new(0.0, 0.0, 3.0),
            limits: None,
        };

        let joint = Joint::from_desc(JointId::new(0), &desc, &identity, &identity);
        let JointKind::Hinge { local_axis_a, .. } = joint.kind else {
            panic!("expected a hinge");
        };
        assert!((local_axis_a.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_warm_start() {
        let identity = Transform::identity();
        let desc = JointDesc::BallSocket {
            body_a: BodyId::new(0),
            body_b: BodyId::new(1),
            anchor: Point3::origin(),
        };
        let mut joint = Joint::from_desc(JointId::new(0), &desc, &identity, &identity);
        if let JointKind::BallSocket { impulse } = &mut joint.kind {
            *impulse = Vector3::new(1.0, 2.0, 3.0);
        }
        joint.reset_warm_start();
        let JointKind::BallSocket { impulse } = joint.kind else {
            panic!("expected ball-socket");
        };
        assert_eq!(impulse, Vector3::zeros());
    }
}
