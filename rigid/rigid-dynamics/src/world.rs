//! The dynamics world: body lifecycle, fixed-step pipeline, sleeping.

use nalgebra::{Matrix3, Point3, Quaternion, UnitQuaternion, Vector3};
use tracing::{debug, trace, warn};

use rigid_collision::{
    collide, Aabb, ContactManifold, ManifoldStore, PairEvent, PairKey, PairManager, Shape,
    ShapeRegistry, SweepAndPrune, COLLISION_MARGIN,
};
use rigid_constraint::{
    build_islands, solve_island, BodyFlags, Island, Joint, JointDesc, SolverBody, SolverParams,
};
use rigid_types::{
    BodyId, JointId, Material, PhysicsError, Result, Transform, Velocity, WorldConfig,
};

use crate::body::RigidBody;
use crate::links::LinkArena;

/// A world of rigid bodies advanced by a fixed-timestep pipeline.
///
/// Each [`update`](DynamicsWorld::update) call advances the simulation by
/// exactly the configured timestep, running the stages in order: force
/// integration, AABB refresh, broad phase, narrow phase, manifold update,
/// island construction, constraint solving, position integration, sleep
/// bookkeeping.
///
/// # Example
///
/// ```
/// use rigid_dynamics::DynamicsWorld;
/// use rigid_collision::Shape;
/// use rigid_types::{Transform, WorldConfig};
/// use nalgebra::{Point3, Vector3};
///
/// let mut world = DynamicsWorld::new(WorldConfig::default()).unwrap();
/// let shape = Shape::sphere(0.5);
/// let body = world
///     .create_body(
///         Transform::from_position(Point3::new(0.0, 10.0, 0.0)),
///         1.0,
///         shape.local_inertia(1.0),
///         shape,
///     )
///     .unwrap();
///
/// world.start();
/// for _ in 0..60 {
///     world.update();
/// }
///
/// let transform = world.body(body).unwrap().transform();
/// assert!(transform.position.y < 10.0, "the sphere fell");
/// ```
#[derive(Debug)]
pub struct DynamicsWorld {
    config: WorldConfig,
    bodies: Vec<Option<RigidBody>>,
    free_body_ids: Vec<u32>,
    shapes: ShapeRegistry,
    broad_phase: SweepAndPrune,
    pairs: PairManager,
    manifolds: ManifoldStore,
    joints: Vec<Option<Joint>>,
    free_joint_ids: Vec<u32>,
    contact_links: LinkArena,
    joint_links: LinkArena,
    interpolation_factor: f64,
    running: bool,
    step_count: u64,
}

impl DynamicsWorld {
    /// Create a world from a configuration.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            bodies: Vec::new(),
            free_body_ids: Vec::new(),
            shapes: ShapeRegistry::new(),
            broad_phase: SweepAndPrune::new(),
            pairs: PairManager::new(),
            manifolds: ManifoldStore::new(),
            joints: Vec::new(),
            free_joint_ids: Vec::new(),
            contact_links: LinkArena::default(),
            joint_links: LinkArena::default(),
            interpolation_factor: 1.0,
            running: false,
            step_count: 0,
        })
    }

    /// Create a world from gravity and timestep, with defaults elsewhere.
    pub fn create(gravity: Vector3<f64>, timestep: f64) -> Result<Self> {
        Self::new(WorldConfig::with_timestep(timestep).with_gravity(gravity))
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The world's configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Set the gravity vector.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.config.gravity = gravity;
    }

    /// Toggle gravity globally.
    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        self.config.gravity_enabled = enabled;
    }

    /// Allow or forbid sleeping. Forbidding wakes every body.
    pub fn set_sleeping_enabled(&mut self, enabled: bool) {
        self.config.sleeping_enabled = enabled;
        if !enabled {
            for body in self.bodies.iter_mut().flatten() {
                body.wake();
            }
        }
    }

    /// Number of velocity solver iterations per step.
    #[must_use]
    pub fn velocity_iterations(&self) -> usize {
        self.config.velocity_iterations
    }

    /// Set the number of velocity solver iterations per step.
    pub fn set_velocity_iterations(&mut self, iterations: usize) {
        self.config.velocity_iterations = iterations.max(1);
    }

    /// Number of position solver iterations per step.
    #[must_use]
    pub fn position_iterations(&self) -> usize {
        self.config.position_iterations
    }

    /// Set the number of position solver iterations per step.
    pub fn set_position_iterations(&mut self, iterations: usize) {
        self.config.position_iterations = iterations;
    }

    /// Begin simulating; `update` is a no-op before this call.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop simulating; pending contacts simply freeze.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Set the render interpolation factor in [0, 1].
    pub fn set_interpolation_factor(&mut self, factor: f64) {
        self.interpolation_factor = factor.clamp(0.0, 1.0);
    }

    // =========================================================================
    // Body lifecycle
    // =========================================================================

    /// Create a dynamic rigid body.
    ///
    /// The transform's position is the body's center of mass; the inertia
    /// tensor is about that center in local coordinates (shapes provide it
    /// through [`Shape::local_inertia`]).
    pub fn create_body(
        &mut self,
        transform: Transform,
        mass: f64,
        inertia_tensor: Matrix3<f64>,
        shape: Shape,
    ) -> Result<BodyId> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PhysicsError::InvalidMassProperties {
                reason: "mass must be positive and finite",
            });
        }
        let Some(inv_inertia) = inertia_tensor.try_inverse() else {
            return Err(PhysicsError::InvalidMassProperties {
                reason: "inertia tensor must be invertible",
            });
        };
        self.insert_body(
            transform,
            mass,
            1.0 / mass,
            inertia_tensor,
            inv_inertia,
            shape,
            true,
        )
    }

    /// Create a static (immovable) body.
    pub fn create_static_body(&mut self, transform: Transform, shape: Shape) -> Result<BodyId> {
        self.insert_body(
            transform,
            0.0,
            0.0,
            Matrix3::zeros(),
            Matrix3::zeros(),
            shape,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_body(
        &mut self,
        transform: Transform,
        mass: f64,
        inv_mass: f64,
        local_inertia: Matrix3<f64>,
        inv_local_inertia: Matrix3<f64>,
        shape: Shape,
        motion_enabled: bool,
    ) -> Result<BodyId> {
        let id = self.next_body_id()?;
        let shape_handle = self.shapes.acquire(shape);
        let aabb = Aabb::from_shape(&shape, &transform, COLLISION_MARGIN);

        let body = RigidBody {
            id,
            transform,
            previous_transform: transform,
            velocity: Velocity::zero(),
            mass,
            inv_mass,
            local_inertia,
            inv_local_inertia,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            material: Material::new(
                self.config.default_restitution,
                self.config.default_friction,
            ),
            motion_enabled,
            collision_enabled: true,
            gravity_enabled: true,
            sleeping: false,
            sleep_timer: 0.0,
            shape: shape_handle,
            aabb,
            has_moved: false,
            contact_list: None,
            joint_list: None,
        };

        if id.index() == self.bodies.len() {
            self.bodies.push(Some(body));
        } else {
            self.bodies[id.index()] = Some(body);
        }
        self.broad_phase.add(id, aabb, &mut self.pairs);
        self.process_pair_events();
        Ok(id)
    }

    fn next_body_id(&mut self) -> Result<BodyId> {
        if let Some(id) = self.free_body_ids.pop() {
            return Ok(BodyId::new(id));
        }
        let id = self.bodies.len();
        // Conservative: refuse the last representable id outright
        if id >= u32::MAX as usize {
            return Err(PhysicsError::IdSpaceExhausted { limit: u32::MAX });
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = id as u32;
        Ok(BodyId::new(id))
    }

    /// Destroy a body, removing its contacts and joints and recycling its id.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        if self.body(id).is_none() {
            return Err(PhysicsError::UnknownBody(id.raw()));
        }

        // Everything resting on or attached to the body must re-settle
        self.wake_island(id);

        let joint_ids: Vec<JointId> = {
            let body = self.bodies[id.index()].as_ref().ok_or_else(|| {
                PhysicsError::UnknownBody(id.raw())
            })?;
            self.joint_links
                .iter(body.joint_list)
                .map(JointId::new)
                .collect()
        };
        for joint_id in joint_ids {
            let _ = self.destroy_joint(joint_id);
        }

        self.broad_phase.remove(id, &mut self.pairs);
        self.process_pair_events();

        let shape_handle = self.bodies[id.index()]
            .as_ref()
            .map(RigidBody::shape)
            .ok_or_else(|| PhysicsError::UnknownBody(id.raw()))?;
        self.shapes.release(shape_handle)?;

        self.bodies[id.index()] = None;
        self.free_body_ids.push(id.raw());
        Ok(())
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.index()).and_then(Option::as_ref)
    }

    /// Iterate over the live bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter().flatten()
    }

    /// Number of live bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.iter().filter(|slot| slot.is_some()).count()
    }

    /// The shape of a body.
    #[must_use]
    pub fn body_shape(&self, id: BodyId) -> Option<&Shape> {
        self.body(id).and_then(|body| self.shapes.get(body.shape()))
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::UnknownBody(id.raw()))
    }

    // =========================================================================
    // Joints
    // =========================================================================

    /// Create a joint between two live bodies.
    pub fn create_joint(&mut self, desc: JointDesc) -> Result<JointId> {
        if let JointDesc::Hinge { axis, .. } | JointDesc::Slider { axis, .. } = &desc {
            if axis.norm_squared() < 1e-20 {
                return Err(PhysicsError::ZeroLengthVector {
                    context: "joint axis",
                });
            }
        }
        let body_a = desc.body_a();
        let body_b = desc.body_b();
        let transform_a = *self
            .body(body_a)
            .ok_or(PhysicsError::UnknownBody(body_a.raw()))?
            .transform();
        let transform_b = *self
            .body(body_b)
            .ok_or(PhysicsError::UnknownBody(body_b.raw()))?
            .transform();

        let id = if let Some(id) = self.free_joint_ids.pop() {
            JointId::new(id)
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let next = self.joints.len() as u32;
            JointId::new(next)
        };

        let joint = Joint::from_desc(id, &desc, &transform_a, &transform_b);
        if id.index() == self.joints.len() {
            self.joints.push(Some(joint));
        } else {
            self.joints[id.index()] = Some(joint);
        }

        for body_id in [body_a, body_b] {
            let head = self.body_mut(body_id)?.joint_list;
            let new_head = self.joint_links.push(head, id.raw());
            self.body_mut(body_id)?.joint_list = Some(new_head);
        }
        self.wake_island(body_a);
        self.wake_island(body_b);
        Ok(id)
    }

    /// Destroy a joint.
    pub fn destroy_joint(&mut self, id: JointId) -> Result<()> {
        let joint = self
            .joints
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(PhysicsError::UnknownJoint(id.raw()))?;

        for body_id in [joint.body_a, joint.body_b] {
            if let Ok(body) = self.body_mut(body_id) {
                let head = body.joint_list;
                let (new_head, found) = self.joint_links.remove(head, id.raw());
                self.body_mut(body_id)?.joint_list = new_head;
                if !found {
                    return Err(PhysicsError::JointNotAttached(id.raw()));
                }
            }
        }
        self.free_joint_ids.push(id.raw());
        self.wake_island(joint.body_a);
        self.wake_island(joint.body_b);
        Ok(())
    }

    // =========================================================================
    // Body state
    // =========================================================================

    /// Overwrite a body's transform. Wakes the body and its island.
    pub fn set_transform(&mut self, id: BodyId, transform: Transform) -> Result<()> {
        self.wake_island(id);
        let body = self.body_mut(id)?;
        body.transform = transform;
        body.previous_transform = transform;
        body.has_moved = true;
        Ok(())
    }

    /// Set a body's linear velocity. Wakes the body and its island.
    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vector3<f64>) -> Result<()> {
        self.wake_island(id);
        self.body_mut(id)?.velocity.linear = velocity;
        Ok(())
    }

    /// Set a body's angular velocity. Wakes the body and its island.
    pub fn set_angular_velocity(&mut self, id: BodyId, velocity: Vector3<f64>) -> Result<()> {
        self.wake_island(id);
        self.body_mut(id)?.velocity.angular = velocity;
        Ok(())
    }

    /// Accumulate a force through the center of mass.
    ///
    /// Wakes the body and its island; the accumulator is cleared at the end
    /// of the next step.
    pub fn apply_force_to_center(&mut self, id: BodyId, force: Vector3<f64>) -> Result<()> {
        self.wake_island(id);
        self.body_mut(id)?.force += force;
        Ok(())
    }

    /// Accumulate a force acting at a world-space point.
    pub fn apply_force(
        &mut self,
        id: BodyId,
        force: Vector3<f64>,
        world_point: Point3<f64>,
    ) -> Result<()> {
        self.wake_island(id);
        let body = self.body_mut(id)?;
        let arm = world_point - body.transform.position;
        body.force += force;
        body.torque += arm.cross(&force);
        Ok(())
    }

    /// Accumulate a torque.
    pub fn apply_torque(&mut self, id: BodyId, torque: Vector3<f64>) -> Result<()> {
        self.wake_island(id);
        self.body_mut(id)?.torque += torque;
        Ok(())
    }

    /// Set a body's mass.
    pub fn set_mass(&mut self, id: BodyId, mass: f64) -> Result<()> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PhysicsError::InvalidMassProperties {
                reason: "mass must be positive and finite",
            });
        }
        let body = self.body_mut(id)?;
        body.mass = mass;
        body.inv_mass = 1.0 / mass;
        Ok(())
    }

    /// Set a body's local inertia tensor.
    pub fn set_inertia_tensor_local(&mut self, id: BodyId, inertia: Matrix3<f64>) -> Result<()> {
        let Some(inverse) = inertia.try_inverse() else {
            return Err(PhysicsError::InvalidMassProperties {
                reason: "inertia tensor must be invertible",
            });
        };
        let body = self.body_mut(id)?;
        body.local_inertia = inertia;
        body.inv_local_inertia = inverse;
        Ok(())
    }

    /// Set a body's linear damping coefficient.
    pub fn set_linear_damping(&mut self, id: BodyId, damping: f64) -> Result<()> {
        if damping < 0.0 {
            return Err(PhysicsError::NegativeDamping(damping));
        }
        self.body_mut(id)?.linear_damping = damping;
        Ok(())
    }

    /// Set a body's angular damping coefficient.
    pub fn set_angular_damping(&mut self, id: BodyId, damping: f64) -> Result<()> {
        if damping < 0.0 {
            return Err(PhysicsError::NegativeDamping(damping));
        }
        self.body_mut(id)?.angular_damping = damping;
        Ok(())
    }

    /// Set a body's surface material.
    pub fn set_material(&mut self, id: BodyId, material: Material) -> Result<()> {
        self.body_mut(id)?.material = material;
        Ok(())
    }

    /// Enable or disable motion. Disabled bodies are immovable.
    pub fn enable_motion(&mut self, id: BodyId, enabled: bool) -> Result<()> {
        self.wake_island(id);
        self.body_mut(id)?.motion_enabled = enabled;
        Ok(())
    }

    /// Enable or disable collision detection for a body.
    ///
    /// Disabling destroys the body's current contact manifolds.
    pub fn enable_collision(&mut self, id: BodyId, enabled: bool) -> Result<()> {
        let body = self.body_mut(id)?;
        body.collision_enabled = enabled;
        if enabled {
            // Force an AABB refresh on the next step
            body.has_moved = true;
        } else {
            let handles: Vec<usize> = {
                let body = self
                    .body(id)
                    .ok_or(PhysicsError::UnknownBody(id.raw()))?;
                self.contact_links
                    .iter(body.contact_list)
                    .map(|h| h as usize)
                    .collect()
            };
            for handle in handles {
                self.destroy_manifold(handle);
            }
        }
        Ok(())
    }

    /// Enable or disable gravity for a body.
    pub fn enable_gravity(&mut self, id: BodyId, enabled: bool) -> Result<()> {
        self.body_mut(id)?.gravity_enabled = enabled;
        Ok(())
    }

    /// Transform interpolated by the current interpolation factor.
    pub fn interpolated_transform(&self, id: BodyId) -> Result<Transform> {
        let body = self.body(id).ok_or(PhysicsError::UnknownBody(id.raw()))?;
        Ok(body.interpolated_transform(self.interpolation_factor))
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Total kinetic energy of the dynamic bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies().map(RigidBody::kinetic_energy).sum()
    }

    /// Total linear momentum of the dynamic bodies.
    #[must_use]
    pub fn total_linear_momentum(&self) -> Vector3<f64> {
        self.bodies()
            .filter(|body| body.is_dynamic())
            .map(|body| body.velocity.linear_momentum(body.mass))
            .sum()
    }

    /// Number of active broad-phase pairs.
    #[must_use]
    pub fn active_pair_count(&self) -> usize {
        self.pairs.active_count()
    }

    /// Number of live contact manifolds.
    #[must_use]
    pub fn manifold_count(&self) -> usize {
        self.manifolds.len()
    }

    /// Access the manifolds (read-only, for diagnostics and tests).
    #[must_use]
    pub fn manifolds(&self) -> &ManifoldStore {
        &self.manifolds
    }

    // =========================================================================
    // The step pipeline
    // =========================================================================

    /// Advance the world by exactly one fixed timestep.
    ///
    /// Does nothing before [`start`](Self::start) or after
    /// [`stop`](Self::stop). The step is atomic: there is no mid-step
    /// cancellation.
    pub fn update(&mut self) {
        if !self.running {
            return;
        }
        let dt = self.config.timestep;

        self.save_previous_transforms();
        self.integrate_forces(dt);
        self.refresh_moved_aabbs();
        self.process_pair_events();
        self.run_narrow_phase();
        let islands = self.build_step_islands();
        self.solve_islands(&islands, dt);
        self.clear_forces();
        self.update_sleep_state(&islands, dt);

        self.step_count += 1;
        trace!(
            step = self.step_count,
            bodies = self.body_count(),
            pairs = self.pairs.active_count(),
            islands = islands.len(),
            "step complete"
        );
    }

    fn save_previous_transforms(&mut self) {
        for body in self.bodies.iter_mut().flatten() {
            body.previous_transform = body.transform;
        }
    }

    /// Apply gravity, accumulated forces and damping to the velocities.
    fn integrate_forces(&mut self, dt: f64) {
        let gravity = if self.config.gravity_enabled {
            self.config.gravity
        } else {
            Vector3::zeros()
        };

        for body in self.bodies.iter_mut().flatten() {
            if !body.is_dynamic() || body.sleeping {
                continue;
            }
            let mut acceleration = body.force * body.inv_mass;
            if body.gravity_enabled {
                acceleration += gravity;
            }
            body.velocity.linear += acceleration * dt;
            body.velocity.angular += body.inv_inertia_world() * body.torque * dt;

            body.velocity.linear *= 1.0 / (1.0 + dt * body.linear_damping);
            body.velocity.angular *= 1.0 / (1.0 + dt * body.angular_damping);
        }
    }

    /// Push the AABBs of moved bodies into the broad phase.
    fn refresh_moved_aabbs(&mut self) {
        let moved: Vec<(BodyId, Transform)> = self
            .bodies
            .iter()
            .flatten()
            .filter(|body| body.has_moved && body.is_collision_enabled())
            .map(|body| (body.id, body.transform))
            .collect();

        for (id, transform) in moved {
            let Some(shape) = self.body_shape(id).copied() else {
                continue;
            };
            let aabb = Aabb::from_shape(&shape, &transform, COLLISION_MARGIN);
            self.broad_phase.update(id, aabb, &mut self.pairs);
            if let Some(body) = self.bodies[id.index()].as_mut() {
                body.aabb = aabb;
                body.has_moved = false;
            }
        }
    }

    /// Destroy the manifolds of pairs that stopped overlapping.
    fn process_pair_events(&mut self) {
        for event in self.pairs.drain_events() {
            match event {
                PairEvent::Added(_) => {
                    // Manifolds are created lazily on the first narrow-phase
                    // contact
                }
                PairEvent::Removed { manifold, .. } => {
                    if let Some(handle) = manifold {
                        self.destroy_manifold(handle);
                    }
                }
            }
        }
    }

    fn destroy_manifold(&mut self, handle: usize) {
        let Some(manifold) = self.manifolds.remove(handle) else {
            return;
        };
        #[allow(clippy::cast_possible_truncation)]
        let payload = handle as u32;
        for body_id in [manifold.body_a, manifold.body_b] {
            if let Some(body) = self.bodies.get_mut(body_id.index()).and_then(Option::as_mut) {
                let (new_head, _) = self.contact_links.remove(body.contact_list, payload);
                body.contact_list = new_head;
            }
        }
        if let Some(record) = self
            .pairs
            .get_mut(PairKey::new(manifold.body_a, manifold.body_b))
        {
            record.manifold = None;
        }
    }

    /// Run the narrow phase over the active pairs and update the manifolds.
    fn run_narrow_phase(&mut self) {
        let active: Vec<(PairKey, Option<usize>)> = self
            .pairs
            .active_pairs()
            .map(|pair| (pair.key, pair.manifold))
            .collect();

        for (key, manifold_handle) in active {
            let (id_a, id_b) = (key.first(), key.second());
            let (Some(body_a), Some(body_b)) = (self.body(id_a), self.body(id_b)) else {
                continue;
            };
            if !body_a.is_collision_enabled() || !body_b.is_collision_enabled() {
                continue;
            }
            // At least one body must be dynamic and awake
            let a_active = body_a.is_dynamic() && !body_a.is_sleeping();
            let b_active = body_b.is_dynamic() && !body_b.is_sleeping();
            if !a_active && !b_active {
                continue;
            }

            let transform_a = *body_a.transform();
            let transform_b = *body_b.transform();
            let material = body_a.material().combine(&body_b.material());
            let (Some(shape_a), Some(shape_b)) =
                (self.body_shape(id_a).copied(), self.body_shape(id_b).copied())
            else {
                continue;
            };

            if let Some(handle) = manifold_handle {
                if let Some(manifold) = self.manifolds.get_mut(handle) {
                    manifold.refresh(&transform_a, &transform_b);
                    manifold.material = material;
                }
            }

            let Some(info) = collide(&shape_a, &transform_a, &shape_b, &transform_b) else {
                continue;
            };

            let handle = match manifold_handle {
                Some(handle) => handle,
                None => {
                    let handle = self
                        .manifolds
                        .insert(ContactManifold::new(id_a, id_b, material));
                    self.pairs.set_manifold(key, handle);
                    #[allow(clippy::cast_possible_truncation)]
                    let payload = handle as u32;
                    for body_id in [id_a, id_b] {
                        if let Ok(body) = self.body_mut(body_id) {
                            let head = body.contact_list;
                            let new_head = self.contact_links.push(head, payload);
                            if let Ok(body) = self.body_mut(body_id) {
                                body.contact_list = Some(new_head);
                            }
                        }
                    }
                    // A fresh touch wakes a sleeping partner
                    if !a_active {
                        self.wake_island(id_a);
                    }
                    if !b_active {
                        self.wake_island(id_b);
                    }
                    handle
                }
            };
            if let Some(manifold) = self.manifolds.get_mut(handle) {
                manifold.add_point(&info, &transform_a, &transform_b);
            }
        }
    }

    fn build_step_islands(&self) -> Vec<Island> {
        let flags: Vec<BodyFlags> = self
            .bodies
            .iter()
            .map(|slot| match slot {
                Some(body) => BodyFlags {
                    exists: true,
                    dynamic: body.is_dynamic(),
                    awake: !body.is_sleeping(),
                },
                None => BodyFlags::default(),
            })
            .collect();

        let contacts: Vec<(usize, BodyId, BodyId)> = self
            .manifolds
            .iter()
            .filter(|(_, manifold)| !manifold.is_empty())
            .map(|(handle, manifold)| (handle, manifold.body_a, manifold.body_b))
            .collect();

        let joints: Vec<(JointId, BodyId, BodyId)> = self
            .joints
            .iter()
            .flatten()
            .map(|joint| (joint.id, joint.body_a, joint.body_b))
            .collect();

        build_islands(&flags, &contacts, &joints)
    }

    fn solve_islands(&mut self, islands: &[Island], dt: f64) {
        let mut solver_bodies: Vec<SolverBody> = self
            .bodies
            .iter()
            .map(|slot| match slot {
                Some(body) if body.is_dynamic() && !body.is_sleeping() => SolverBody {
                    position: body.transform.position,
                    orientation: body.transform.orientation,
                    linear: body.velocity.linear,
                    angular: body.velocity.angular,
                    pseudo_linear: Vector3::zeros(),
                    pseudo_angular: Vector3::zeros(),
                    inv_mass: body.inv_mass,
                    inv_inertia_world: body.inv_inertia_world(),
                },
                Some(body) => {
                    SolverBody::fixed(body.transform.position, body.transform.orientation)
                }
                None => SolverBody::fixed(Point3::origin(), UnitQuaternion::identity()),
            })
            .collect();

        let params = SolverParams {
            dt,
            velocity_iterations: self.config.velocity_iterations,
            position_iterations: self.config.position_iterations,
        };
        for island in islands {
            solve_island(
                island,
                &mut solver_bodies,
                &mut self.manifolds,
                &mut self.joints,
                &params,
            );
        }

        self.integrate_positions(&solver_bodies, dt);
    }

    /// Commit solved velocities and advance the transforms.
    fn integrate_positions(&mut self, solver_bodies: &[SolverBody], dt: f64) {
        for (index, slot) in self.bodies.iter_mut().enumerate() {
            let Some(body) = slot else { continue };
            if !body.is_dynamic() || body.sleeping {
                continue;
            }
            let solved = &solver_bodies[index];

            let move_linear = solved.linear + solved.pseudo_linear;
            let move_angular = solved.angular + solved.pseudo_angular;
            if !(move_linear.iter().all(|x| x.is_finite())
                && move_angular.iter().all(|x| x.is_finite()))
            {
                warn!(body = index, "non-finite velocity clamped to zero");
                body.velocity = Velocity::zero();
                continue;
            }

            body.velocity.linear = solved.linear;
            body.velocity.angular = solved.angular;

            if move_linear.norm_squared() > 0.0 || move_angular.norm_squared() > 0.0 {
                body.transform.position += move_linear * dt;
                // q <- normalize(q + 0.5 * omega * q * dt)
                let q = body.transform.orientation.into_inner();
                let spin = Quaternion::from_parts(0.0, move_angular);
                body.transform.orientation =
                    UnitQuaternion::from_quaternion(q + spin * q * (0.5 * dt));
                body.has_moved = true;
            }
        }
    }

    /// End-of-step force clearing (the only place accumulators are reset).
    fn clear_forces(&mut self) {
        for body in self.bodies.iter_mut().flatten() {
            if body.sleeping {
                continue;
            }
            body.force = Vector3::zeros();
            body.torque = Vector3::zeros();
        }
    }

    /// Advance sleep timers; islands below the thresholds long enough fall
    /// asleep as a unit.
    fn update_sleep_state(&mut self, islands: &[Island], dt: f64) {
        if !self.config.sleeping_enabled {
            return;
        }
        let sleep = self.config.sleep;
        let linear_sq = sleep.linear_threshold * sleep.linear_threshold;
        let angular_sq = sleep.angular_threshold * sleep.angular_threshold;

        for island in islands {
            let mut island_timer = f64::INFINITY;
            for &id in &island.bodies {
                let Some(body) = self.bodies.get_mut(id.index()).and_then(Option::as_mut)
                else {
                    continue;
                };
                if !body.is_dynamic() || body.sleeping {
                    continue;
                }
                if body.velocity.linear.norm_squared() > linear_sq
                    || body.velocity.angular.norm_squared() > angular_sq
                {
                    body.sleep_timer = 0.0;
                } else {
                    body.sleep_timer += dt;
                }
                island_timer = island_timer.min(body.sleep_timer);
            }

            if island_timer.is_finite() && island_timer >= sleep.time_before_sleep {
                for &id in &island.bodies {
                    let Some(body) =
                        self.bodies.get_mut(id.index()).and_then(Option::as_mut)
                    else {
                        continue;
                    };
                    if body.is_dynamic() && !body.sleeping {
                        body.fall_asleep();
                    }
                }
                debug!(bodies = island.bodies.len(), "island put to sleep");
            }
        }
    }

    /// Wake a body and everything reachable from it through contacts and
    /// joints (static bodies absorb the traversal).
    pub(crate) fn wake_island(&mut self, start: BodyId) {
        let mut visited = vec![false; self.bodies.len()];
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            let index = id.index();
            if index >= visited.len() || visited[index] {
                continue;
            }
            visited[index] = true;

            let Some(body) = self.bodies[index].as_ref() else {
                continue;
            };
            let propagates = body.is_dynamic() || id == start;
            let contact_head = body.contact_list;
            let joint_head = body.joint_list;

            if let Some(body) = self.bodies[index].as_mut() {
                body.wake();
            }
            if !propagates {
                continue;
            }

            for handle in self.contact_links.iter(contact_head) {
                if let Some(manifold) = self.manifolds.get(handle as usize) {
                    let other = if manifold.body_a == id {
                        manifold.body_b
                    } else {
                        manifold.body_a
                    };
                    if !visited[other.index()] {
                        stack.push(other);
                    }
                }
            }
            for joint_id in self.joint_links.iter(joint_head) {
                if let Some(joint) = self
                    .joints
                    .get(joint_id as usize)
                    .and_then(Option::as_ref)
                {
                    let other = if joint.body_a == id {
                        joint.body_b
                    } else {
                        joint.body_a
                    };
                    if !visited[other.index()] {
                        stack.push(other);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn world() -> DynamicsWorld {
        DynamicsWorld::new(WorldConfig::default()).expect("default config is valid")
    }

    fn dynamic_sphere(world: &mut DynamicsWorld, position: Point3<f64>, mass: f64) -> BodyId {
        let shape = Shape::sphere(0.5);
        world
            .create_body(
                Transform::from_position(position),
                mass,
                shape.local_inertia(mass),
                shape,
            )
            .expect("valid body")
    }

    #[test]
    fn test_body_ids_are_dense_and_recycled() {
        let mut world = world();
        let a = dynamic_sphere(&mut world, Point3::new(0.0, 0.0, 0.0), 1.0);
        let b = dynamic_sphere(&mut world, Point3::new(5.0, 0.0, 0.0), 1.0);
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);

        world.destroy_body(a).unwrap();
        let c = dynamic_sphere(&mut world, Point3::new(10.0, 0.0, 0.0), 1.0);
        assert_eq!(c.raw(), 0, "freed id reused");
        assert_eq!(world.body_count(), 2);
    }

    #[test]
    fn test_create_body_rejects_bad_mass() {
        let mut world = world();
        let shape = Shape::sphere(0.5);
        let result = world.create_body(
            Transform::identity(),
            0.0,
            shape.local_inertia(1.0),
            shape,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_negative_damping_is_rejected() {
        let mut world = world();
        let body = dynamic_sphere(&mut world, Point3::origin(), 1.0);
        assert_eq!(
            world.set_linear_damping(body, -1.0),
            Err(PhysicsError::NegativeDamping(-1.0))
        );
        assert_eq!(
            world.set_angular_damping(body, -0.1),
            Err(PhysicsError::NegativeDamping(-0.1))
        );
        // State unchanged after the rejected calls
        assert_eq!(world.body(body).unwrap().linear_damping(), 0.0);
    }

    #[test]
    fn test_destroying_missing_joint_is_invalid_state() {
        let mut world = world();
        let err = world.destroy_joint(JointId::new(3)).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_update_is_gated_by_start_stop() {
        let mut world = world();
        let body = dynamic_sphere(&mut world, Point3::new(0.0, 10.0, 0.0), 1.0);

        world.update();
        assert_eq!(
            world.body(body).unwrap().transform().position.y,
            10.0,
            "no motion before start()"
        );

        world.start();
        world.update();
        assert!(world.body(body).unwrap().transform().position.y < 10.0);

        let y = world.body(body).unwrap().transform().position.y;
        world.stop();
        world.update();
        assert_eq!(world.body(body).unwrap().transform().position.y, y);
    }

    #[test]
    fn test_static_body_never_moves() {
        let mut world = world();
        let floor = world
            .create_static_body(
                Transform::identity(),
                Shape::box_shape(Vector3::new(5.0, 0.5, 5.0)),
            )
            .unwrap();

        world.start();
        for _ in 0..30 {
            world.update();
        }
        assert_eq!(world.body(floor).unwrap().transform().position.y, 0.0);
    }

    #[test]
    fn test_forces_are_cleared_at_end_of_step() {
        let mut world = world();
        let body = dynamic_sphere(&mut world, Point3::origin(), 2.0);
        world
            .apply_force_to_center(body, Vector3::new(10.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(world.body(body).unwrap().force().x, 10.0);

        world.start();
        world.update();
        assert_eq!(world.body(body).unwrap().force().x, 0.0);
        // The force left its mark on the velocity: F/m * dt
        let expected = 10.0 / 2.0 * world.config().timestep;
        assert_relative_eq!(
            world.body(body).unwrap().linear_velocity().x,
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gravity_toggle() {
        let mut config = WorldConfig::default();
        config.gravity_enabled = false;
        let mut world = DynamicsWorld::new(config).unwrap();
        let body = dynamic_sphere(&mut world, Point3::new(0.0, 10.0, 0.0), 1.0);

        world.start();
        world.update();
        assert_eq!(world.body(body).unwrap().transform().position.y, 10.0);

        world.set_gravity_enabled(true);
        world.update();
        assert!(world.body(body).unwrap().transform().position.y < 10.0);
    }

    #[test]
    fn test_per_body_gravity_flag() {
        let mut world = world();
        let floating = dynamic_sphere(&mut world, Point3::new(0.0, 10.0, 0.0), 1.0);
        let falling = dynamic_sphere(&mut world, Point3::new(5.0, 10.0, 0.0), 1.0);
        world.enable_gravity(floating, false).unwrap();

        world.start();
        world.update();
        assert_eq!(world.body(floating).unwrap().transform().position.y, 10.0);
        assert!(world.body(falling).unwrap().transform().position.y < 10.0);
    }

    #[test]
    fn test_shapes_are_deduplicated() {
        let mut world = world();
        let _ = dynamic_sphere(&mut world, Point3::new(0.0, 0.0, 0.0), 1.0);
        let b = dynamic_sphere(&mut world, Point3::new(5.0, 0.0, 0.0), 1.0);
        let c = dynamic_sphere(&mut world, Point3::new(10.0, 0.0, 0.0), 2.0);
        assert_eq!(
            world.body(b).unwrap().shape(),
            world.body(c).unwrap().shape(),
            "equal shapes share a registry entry"
        );
    }

    #[test]
    fn test_damping_slows_bodies() {
        let mut config = WorldConfig::default().zero_gravity();
        config.sleeping_enabled = false;
        let mut world = DynamicsWorld::new(config).unwrap();
        let body = dynamic_sphere(&mut world, Point3::origin(), 1.0);
        world.set_linear_damping(body, 5.0).unwrap();
        world
            .set_linear_velocity(body, Vector3::new(10.0, 0.0, 0.0))
            .unwrap();

        world.start();
        for _ in 0..60 {
            world.update();
        }
        let speed = world.body(body).unwrap().linear_velocity().norm();
        assert!(speed < 10.0 * 0.7, "damping must bleed velocity");
        assert!(speed > 0.0);
    }

    #[test]
    fn test_quaternion_stays_normalized() {
        let mut config = WorldConfig::default().zero_gravity();
        config.sleeping_enabled = false;
        let mut world = DynamicsWorld::new(config).unwrap();
        let body = dynamic_sphere(&mut world, Point3::origin(), 1.0);
        world
            .set_angular_velocity(body, Vector3::new(3.0, 5.0, -2.0))
            .unwrap();

        world.start();
        for _ in 0..600 {
            world.update();
        }
        let orientation = world.body(body).unwrap().transform().orientation;
        assert!((orientation.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_interpolated_transform() {
        let mut world = world();
        let body = dynamic_sphere(&mut world, Point3::new(0.0, 10.0, 0.0), 1.0);
        world.start();
        world.update();

        let previous = world.body(body).unwrap().interpolated_transform(0.0);
        let current = world.body(body).unwrap().interpolated_transform(1.0);
        assert_eq!(previous.position.y, 10.0);
        assert!(current.position.y < 10.0);

        world.set_interpolation_factor(0.5);
        let half = world.interpolated_transform(body).unwrap();
        let expected = (previous.position.y + current.position.y) * 0.5;
        assert_relative_eq!(half.position.y, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_momentum_conserved_without_external_forces() {
        let mut config = WorldConfig::default().zero_gravity();
        config.sleeping_enabled = false;
        let mut world = DynamicsWorld::new(config).unwrap();

        let a = dynamic_sphere(&mut world, Point3::new(-2.0, 0.0, 0.0), 1.0);
        let b = dynamic_sphere(&mut world, Point3::new(2.0, 0.0, 0.0), 3.0);
        world
            .set_linear_velocity(a, Vector3::new(1.0, 0.0, 0.0))
            .unwrap();
        world
            .set_linear_velocity(b, Vector3::new(-0.5, 0.0, 0.0))
            .unwrap();
        let before = world.total_linear_momentum();

        world.start();
        for _ in 0..120 {
            world.update();
        }
        let after = world.total_linear_momentum();
        assert_relative_eq!(before.x, after.x, epsilon = 1e-9);
    }

    #[test]
    fn test_destroy_body_removes_contacts() {
        let mut world = world();
        let floor = world
            .create_static_body(
                Transform::identity(),
                Shape::box_shape(Vector3::new(5.0, 0.5, 5.0)),
            )
            .unwrap();
        let ball = dynamic_sphere(&mut world, Point3::new(0.0, 1.0, 0.0), 1.0);

        world.start();
        for _ in 0..30 {
            world.update();
        }
        assert!(world.manifold_count() > 0, "ball rests on the floor");

        world.destroy_body(ball).unwrap();
        assert_eq!(world.manifold_count(), 0);
        assert_eq!(world.active_pair_count(), 0);
        let _ = floor;
    }
}
