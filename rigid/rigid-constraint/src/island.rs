//! Island construction.
//!
//! Before solving, awake dynamic bodies are flood-filled across their active
//! contact manifolds and joints into independent groups. Static and sleeping
//! bodies are absorbing nodes: they join the island that touches them but do
//! not propagate the fill, so two stacks resting on the same floor stay in
//! separate islands. Non-dynamic bodies may consequently appear in several
//! islands; every awake dynamic body appears in exactly one.

use rigid_types::{BodyId, JointId};

/// Per-body flags the island builder needs, indexed by dense body id.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyFlags {
    /// Whether this id refers to a live body.
    pub exists: bool,
    /// Whether the body has motion enabled and finite mass.
    pub dynamic: bool,
    /// Whether the body is awake.
    pub awake: bool,
}

impl BodyFlags {
    /// Whether the fill propagates through this body.
    #[must_use]
    fn propagates(&self) -> bool {
        self.dynamic && self.awake
    }
}

/// One independent group of bodies and their constraints.
#[derive(Debug, Clone, Default)]
pub struct Island {
    /// Bodies in this island, in discovery order.
    pub bodies: Vec<BodyId>,
    /// Handles of the contact manifolds inside the island.
    pub manifolds: Vec<usize>,
    /// Ids of the joints inside the island.
    pub joints: Vec<JointId>,
}

impl Island {
    /// Number of bodies in this island.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Check if the island has no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Edge of the constraint graph.
#[derive(Debug, Clone, Copy)]
enum Edge {
    Contact(usize),
    Joint(usize),
}

/// Build the step's islands.
///
/// `contacts` lists `(manifold_handle, body_a, body_b)` for every live
/// manifold with at least one point; `joints` lists `(joint_id, body_a,
/// body_b)`. Both slices are indexed by dense body ids into `flags`.
#[must_use]
pub fn build_islands(
    flags: &[BodyFlags],
    contacts: &[(usize, BodyId, BodyId)],
    joints: &[(JointId, BodyId, BodyId)],
) -> Vec<Island> {
    let body_count = flags.len();

    // Adjacency: per body, the edges that mention it
    let mut adjacency: Vec<Vec<(Edge, BodyId)>> = vec![Vec::new(); body_count];
    for (index, &(_, a, b)) in contacts.iter().enumerate() {
        adjacency[a.index()].push((Edge::Contact(index), b));
        adjacency[b.index()].push((Edge::Contact(index), a));
    }
    for (index, &(_, a, b)) in joints.iter().enumerate() {
        adjacency[a.index()].push((Edge::Joint(index), b));
        adjacency[b.index()].push((Edge::Joint(index), a));
    }

    let mut in_island = vec![false; body_count];
    let mut contact_taken = vec![false; contacts.len()];
    let mut joint_taken = vec![false; joints.len()];
    let mut islands = Vec::new();
    let mut stack: Vec<BodyId> = Vec::new();

    for seed in 0..body_count {
        let seed_flags = flags[seed];
        if !seed_flags.exists || !seed_flags.propagates() || in_island[seed] {
            continue;
        }

        let mut island = Island::default();
        stack.push(BodyId::new(seed as u32));
        in_island[seed] = true;

        while let Some(body) = stack.pop() {
            island.bodies.push(body);

            // Absorbing nodes terminate the fill
            if !flags[body.index()].propagates() {
                continue;
            }

            for &(edge, other) in &adjacency[body.index()] {
                let taken = match edge {
                    Edge::Contact(i) => &mut contact_taken[i],
                    Edge::Joint(i) => &mut joint_taken[i],
                };
                if *taken {
                    continue;
                }
                *taken = true;
                match edge {
                    Edge::Contact(i) => island.manifolds.push(contacts[i].0),
                    Edge::Joint(i) => island.joints.push(joints[i].0),
                }
                if !in_island[other.index()] {
                    in_island[other.index()] = true;
                    stack.push(other);
                }
            }
        }

        // Non-dynamic bodies may be shared between islands; release them so
        // the next fill can absorb them again.
        for body in &island.bodies {
            if !flags[body.index()].dynamic {
                in_island[body.index()] = false;
            }
        }

        islands.push(island);
    }

    islands
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn dynamic_awake() -> BodyFlags {
        BodyFlags {
            exists: true,
            dynamic: true,
            awake: true,
        }
    }

    fn static_body() -> BodyFlags {
        BodyFlags {
            exists: true,
            dynamic: false,
            awake: true,
        }
    }

    fn sleeping() -> BodyFlags {
        BodyFlags {
            exists: true,
            dynamic: true,
            awake: false,
        }
    }

    fn contact(handle: usize, a: u32, b: u32) -> (usize, BodyId, BodyId) {
        (handle, BodyId::new(a), BodyId::new(b))
    }

    #[test]
    fn test_disconnected_bodies_form_separate_islands() {
        let flags = vec![dynamic_awake(), dynamic_awake()];
        let islands = build_islands(&flags, &[], &[]);
        assert_eq!(islands.len(), 2);
    }

    #[test]
    fn test_contact_merges_bodies() {
        let flags = vec![dynamic_awake(), dynamic_awake()];
        let islands = build_islands(&flags, &[contact(7, 0, 1)], &[]);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].bodies.len(), 2);
        assert_eq!(islands[0].manifolds, vec![7]);
    }

    #[test]
    fn test_static_body_does_not_merge_islands() {
        // Two dynamic bodies touching a common static floor
        let flags = vec![dynamic_awake(), static_body(), dynamic_awake()];
        let contacts = vec![contact(0, 0, 1), contact(1, 2, 1)];
        let islands = build_islands(&flags, &contacts, &[]);

        assert_eq!(islands.len(), 2, "the floor must not bridge islands");
        // Each island has its dynamic body, the shared floor, and one contact
        for island in &islands {
            assert_eq!(island.bodies.len(), 2);
            assert_eq!(island.manifolds.len(), 1);
        }
    }

    #[test]
    fn test_sleeping_body_is_absorbing() {
        let flags = vec![dynamic_awake(), sleeping(), dynamic_awake()];
        let contacts = vec![contact(0, 0, 1), contact(1, 1, 2)];
        let islands = build_islands(&flags, &contacts, &[]);

        // The sleeping body does not propagate from body 0 to body 2
        assert_eq!(islands.len(), 2);
    }

    #[test]
    fn test_awake_dynamic_bodies_partition() {
        // Chain: 0 - 1 - 2, plus isolated 3
        let flags = vec![
            dynamic_awake(),
            dynamic_awake(),
            dynamic_awake(),
            dynamic_awake(),
        ];
        let contacts = vec![contact(0, 0, 1), contact(1, 1, 2)];
        let islands = build_islands(&flags, &contacts, &[]);

        assert_eq!(islands.len(), 2);
        let mut seen = vec![0usize; flags.len()];
        for island in &islands {
            for body in &island.bodies {
                seen[body.index()] += 1;
            }
        }
        assert_eq!(seen, vec![1, 1, 1, 1], "each body in exactly one island");
    }

    #[test]
    fn test_joints_connect_islands() {
        let flags = vec![dynamic_awake(), dynamic_awake()];
        let joints = vec![(JointId::new(4), BodyId::new(0), BodyId::new(1))];
        let islands = build_islands(&flags, &[], &joints);

        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].joints, vec![JointId::new(4)]);
    }

    #[test]
    fn test_sleeping_only_groups_are_skipped() {
        let flags = vec![sleeping(), sleeping()];
        let islands = build_islands(&flags, &[contact(0, 0, 1)], &[]);
        assert!(islands.is_empty(), "no awake dynamic body, no island");
    }
}
