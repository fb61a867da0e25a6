//! Persistent contact manifolds.
//!
//! A manifold keeps up to four contact points for one overlapping pair and
//! carries them across frames so the solver's accumulated impulses survive
//! (warm starting). Points are refreshed against the bodies' current
//! transforms each step and dropped once their anchors drift apart.

use nalgebra::{Point3, Vector3};
use rigid_types::{BodyId, Material, Transform};

use crate::narrow::ContactPointInfo;

/// Maximum number of contact points kept per manifold.
pub const MAX_CONTACT_POINTS: usize = 4;

/// Anchor drift beyond which a stored contact point is discarded, and below
/// which a new point is merged into an existing one (meters).
pub const PERSISTENCE_THRESHOLD: f64 = 0.03;

/// One persistent contact point.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    /// Anchor in body A's local frame.
    pub local_a: Point3<f64>,
    /// Anchor in body B's local frame.
    pub local_b: Point3<f64>,
    /// Anchor on body A in world space (refreshed each step).
    pub world_a: Point3<f64>,
    /// Anchor on body B in world space (refreshed each step).
    pub world_b: Point3<f64>,
    /// Unit contact normal, from body A toward body B.
    pub normal: Vector3<f64>,
    /// Penetration depth, >= 0 while the contact is live.
    pub penetration: f64,
    /// Accumulated normal impulse from the previous solve (warm start).
    pub normal_impulse: f64,
    /// Accumulated friction impulses along the two tangents.
    pub tangent_impulse: [f64; 2],
    /// Friction basis used by the previous solve.
    pub tangent: [Vector3<f64>; 2],
}

impl ContactPoint {
    fn from_info(info: &ContactPointInfo, transform_a: &Transform, transform_b: &Transform) -> Self {
        Self {
            local_a: info.local_a,
            local_b: info.local_b,
            world_a: transform_a.transform_point(&info.local_a),
            world_b: transform_b.transform_point(&info.local_b),
            normal: info.normal,
            penetration: info.penetration,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
            tangent: [Vector3::zeros(); 2],
        }
    }
}

/// Persistent set of up to four contact points for one body pair.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    /// The first body of the pair (contact normals point away from it).
    pub body_a: BodyId,
    /// The second body of the pair.
    pub body_b: BodyId,
    /// Combined surface material of the pair.
    pub material: Material,
    points: Vec<ContactPoint>,
}

impl ContactManifold {
    /// Create an empty manifold for a body pair.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, material: Material) -> Self {
        Self {
            body_a,
            body_b,
            material,
            points: Vec::with_capacity(MAX_CONTACT_POINTS),
        }
    }

    /// The current contact points.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Mutable access for the solver's impulse write-back.
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    /// Check whether the manifold has no live points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Refresh stored points against the bodies' current transforms.
    ///
    /// World anchors and penetrations are recomputed from the local anchors;
    /// points whose anchors separated along the normal or drifted apart
    /// tangentially beyond [`PERSISTENCE_THRESHOLD`] are dropped.
    pub fn refresh(&mut self, transform_a: &Transform, transform_b: &Transform) {
        self.points.retain_mut(|point| {
            point.world_a = transform_a.transform_point(&point.local_a);
            point.world_b = transform_b.transform_point(&point.local_b);

            let delta = point.world_a - point.world_b;
            let separation = delta.dot(&point.normal);
            point.penetration = separation;

            if separation < -PERSISTENCE_THRESHOLD {
                return false;
            }
            let tangential = delta - point.normal * separation;
            tangential.norm_squared() <= PERSISTENCE_THRESHOLD * PERSISTENCE_THRESHOLD
        });
    }

    /// Insert a fresh narrow-phase point.
    ///
    /// A point coinciding with a stored one (same local anchor within the
    /// persistence threshold) overwrites its geometry but keeps the
    /// accumulated impulses. Otherwise the point is appended, evicting the
    /// stored point whose removal keeps the largest contact area once the
    /// manifold is full. The deepest point is never evicted.
    pub fn add_point(
        &mut self,
        info: &ContactPointInfo,
        transform_a: &Transform,
        transform_b: &Transform,
    ) {
        let fresh = ContactPoint::from_info(info, transform_a, transform_b);

        // Merge with a near-coincident stored point
        for point in &mut self.points {
            let drift = (point.local_a - fresh.local_a).norm_squared();
            if drift <= PERSISTENCE_THRESHOLD * PERSISTENCE_THRESHOLD {
                let normal_impulse = point.normal_impulse;
                let tangent_impulse = point.tangent_impulse;
                let tangent = point.tangent;
                *point = fresh;
                point.normal_impulse = normal_impulse;
                point.tangent_impulse = tangent_impulse;
                point.tangent = tangent;
                return;
            }
        }

        if self.points.len() < MAX_CONTACT_POINTS {
            self.points.push(fresh);
            return;
        }

        let evict = self.eviction_index(&fresh.local_a);
        self.points[evict] = fresh;
    }

    /// Pick the stored point to replace so that the retained four points
    /// (three stored plus the new one) span the largest area. The deepest
    /// stored point is kept unconditionally.
    fn eviction_index(&self, new_local_a: &Point3<f64>) -> usize {
        debug_assert_eq!(self.points.len(), MAX_CONTACT_POINTS);

        let mut deepest = 0;
        for (index, point) in self.points.iter().enumerate() {
            if point.penetration > self.points[deepest].penetration {
                deepest = index;
            }
        }

        let mut best_index = if deepest == 0 { 1 } else { 0 };
        let mut best_area = -1.0;
        for candidate in 0..MAX_CONTACT_POINTS {
            if candidate == deepest {
                continue;
            }
            // Quadrilateral spanned by the new point and the three survivors,
            // measured by the cross product of its diagonals
            let survivors: Vec<&Point3<f64>> = (0..MAX_CONTACT_POINTS)
                .filter(|&i| i != candidate)
                .map(|i| &self.points[i].local_a)
                .collect();
            let diag_one = survivors[0] - new_local_a;
            let diag_two = survivors[2] - survivors[1];
            let area = diag_one.cross(&diag_two).norm_squared();
            if area > best_area {
                best_area = area;
                best_index = candidate;
            }
        }
        best_index
    }
}

/// Slab of contact manifolds with free-slot reuse.
///
/// Handles are plain indices; a handle stays valid until the manifold is
/// removed.
#[derive(Debug, Default)]
pub struct ManifoldStore {
    slots: Vec<Option<ContactManifold>>,
    free: Vec<usize>,
}

impl ManifoldStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a manifold, returning its handle.
    pub fn insert(&mut self, manifold: ContactManifold) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(manifold);
            index
        } else {
            self.slots.push(Some(manifold));
            self.slots.len() - 1
        }
    }

    /// Remove a manifold by handle.
    pub fn remove(&mut self, handle: usize) -> Option<ContactManifold> {
        let manifold = self.slots.get_mut(handle)?.take();
        if manifold.is_some() {
            self.free.push(handle);
        }
        manifold
    }

    /// Look up a manifold.
    #[must_use]
    pub fn get(&self, handle: usize) -> Option<&ContactManifold> {
        self.slots.get(handle).and_then(Option::as_ref)
    }

    /// Look up a manifold mutably.
    pub fn get_mut(&mut self, handle: usize) -> Option<&mut ContactManifold> {
        self.slots.get_mut(handle).and_then(Option::as_mut)
    }

    /// Number of live manifolds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over live manifolds with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ContactManifold)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|m| (i, m)))
    }
}
