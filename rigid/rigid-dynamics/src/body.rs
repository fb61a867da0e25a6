//! Rigid bodies.

use nalgebra::{Matrix3, Vector3};
use rigid_collision::{Aabb, ShapeHandle};
use rigid_types::{BodyId, Material, Transform, Velocity};

/// A rigid body owned by a [`DynamicsWorld`](crate::DynamicsWorld).
///
/// Bodies are created through the world; user code reaches them through
/// their [`BodyId`]. A body with motion disabled (or created static) has
/// zero inverse mass and inertia: the solver treats it as immovable.
#[derive(Debug, Clone)]
pub struct RigidBody {
    /// The body's id within its world.
    pub(crate) id: BodyId,
    /// Current transform (center of mass at the position).
    pub(crate) transform: Transform,
    /// Transform at the start of the current step, for interpolation.
    pub(crate) previous_transform: Transform,
    /// Linear and angular velocity.
    pub(crate) velocity: Velocity,
    /// Mass in kg (static bodies keep their construction mass).
    pub(crate) mass: f64,
    /// Inverse mass; zero when static or motion-disabled.
    pub(crate) inv_mass: f64,
    /// Local inertia tensor.
    pub(crate) local_inertia: Matrix3<f64>,
    /// Inverse local inertia tensor; zero when static.
    pub(crate) inv_local_inertia: Matrix3<f64>,
    /// Accumulated external force, cleared at end of step.
    pub(crate) force: Vector3<f64>,
    /// Accumulated external torque, cleared at end of step.
    pub(crate) torque: Vector3<f64>,
    /// Linear damping coefficient, >= 0.
    pub(crate) linear_damping: f64,
    /// Angular damping coefficient, >= 0.
    pub(crate) angular_damping: f64,
    /// Surface material.
    pub(crate) material: Material,
    /// Whether the body is simulated (false = static).
    pub(crate) motion_enabled: bool,
    /// Whether the body participates in collision detection.
    pub(crate) collision_enabled: bool,
    /// Whether gravity applies to this body.
    pub(crate) gravity_enabled: bool,
    /// Whether the body is asleep.
    pub(crate) sleeping: bool,
    /// Seconds spent below the sleep velocity thresholds.
    pub(crate) sleep_timer: f64,
    /// Handle of the body's collision shape.
    pub(crate) shape: ShapeHandle,
    /// World-space AABB from the last refresh.
    pub(crate) aabb: Aabb,
    /// Set when the transform changed since the last AABB refresh.
    pub(crate) has_moved: bool,
    /// Head of the body's contact-manifold list.
    pub(crate) contact_list: Option<usize>,
    /// Head of the body's joint list.
    pub(crate) joint_list: Option<usize>,
}

impl RigidBody {
    /// The body's id.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Current transform.
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Current linear velocity.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.velocity.linear
    }

    /// Current angular velocity.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.velocity.angular
    }

    /// Mass in kg.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse mass as the solver sees it (zero when immovable).
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        if self.motion_enabled {
            self.inv_mass
        } else {
            0.0
        }
    }

    /// Accumulated external force.
    #[must_use]
    pub fn force(&self) -> Vector3<f64> {
        self.force
    }

    /// Accumulated external torque.
    #[must_use]
    pub fn torque(&self) -> Vector3<f64> {
        self.torque
    }

    /// Surface material.
    #[must_use]
    pub fn material(&self) -> Material {
        self.material
    }

    /// Linear damping coefficient.
    #[must_use]
    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    /// Angular damping coefficient.
    #[must_use]
    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    /// Whether the body is asleep.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Whether the body is simulated by the solver.
    #[must_use]
    pub fn is_motion_enabled(&self) -> bool {
        self.motion_enabled
    }

    /// Whether the body participates in collision detection.
    #[must_use]
    pub fn is_collision_enabled(&self) -> bool {
        self.collision_enabled
    }

    /// Whether gravity applies to this body.
    #[must_use]
    pub fn is_gravity_enabled(&self) -> bool {
        self.gravity_enabled
    }

    /// Whether the body can move: motion enabled and finite mass.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.motion_enabled && self.inv_mass > 0.0
    }

    /// Handle of the body's collision shape.
    #[must_use]
    pub fn shape(&self) -> ShapeHandle {
        self.shape
    }

    /// World-space AABB from the last broad-phase refresh.
    #[must_use]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Inverse inertia tensor in world coordinates: `R · I⁻¹ · Rᵀ`.
    ///
    /// Zero for immovable bodies.
    #[must_use]
    pub fn inv_inertia_world(&self) -> Matrix3<f64> {
        if !self.motion_enabled {
            return Matrix3::zeros();
        }
        let rotation = self.transform.rotation_matrix();
        rotation * self.inv_local_inertia * rotation.transpose()
    }

    /// Kinetic energy of the body.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        if !self.is_dynamic() {
            return 0.0;
        }
        let rotation = self.transform.rotation_matrix();
        let inertia_world = rotation * self.local_inertia * rotation.transpose();
        self.velocity.kinetic_energy(self.mass, &inertia_world)
    }

    /// Interpolated transform between the previous and current step.
    #[must_use]
    pub fn interpolated_transform(&self, factor: f64) -> Transform {
        self.previous_transform.lerp(&self.transform, factor)
    }

    /// Put the body to sleep: velocities and accumulators are zeroed.
    pub(crate) fn fall_asleep(&mut self) {
        self.sleeping = true;
        self.velocity = Velocity::zero();
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    /// Wake the body and restart its sleep countdown.
    pub(crate) fn wake(&mut self) {
        self.sleeping = false;
        self.sleep_timer = 0.0;
    }
}
