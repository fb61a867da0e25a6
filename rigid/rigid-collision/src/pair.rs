//! Overlapping-pair bookkeeping between the broad phase and the world.
//!
//! The broad phase reports per-axis interval overlaps; a pair is *active*
//! (surfaced to the narrow phase) only while its AABBs overlap on all three
//! axes. Activation and deactivation are reported as events which the world
//! drains once per step.

use hashbrown::HashMap;
use rigid_types::BodyId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bitmask value meaning "overlapping on X, Y and Z".
const ALL_AXES: u8 = 0b111;

/// Canonical unordered key for a pair of bodies.
///
/// The smaller id is always stored first, so `{a, b}` and `{b, a}` hash and
/// compare identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairKey {
    first: BodyId,
    second: BodyId,
}

impl PairKey {
    /// Create a canonical key from two body ids.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// The smaller body id.
    #[must_use]
    pub const fn first(&self) -> BodyId {
        self.first
    }

    /// The larger body id.
    #[must_use]
    pub const fn second(&self) -> BodyId {
        self.second
    }

    /// Check whether the key mentions a body.
    #[must_use]
    pub fn contains(&self, body: BodyId) -> bool {
        self.first == body || self.second == body
    }
}

/// A pair whose AABBs overlap on at least one axis.
#[derive(Debug, Clone)]
pub struct OverlappingPair {
    /// The canonical pair key.
    pub key: PairKey,
    /// Per-axis overlap bits (bit k set = intervals overlap on axis k).
    axis_bits: u8,
    /// Handle of the contact manifold for this pair, once the narrow phase
    /// has produced one.
    pub manifold: Option<usize>,
}

impl OverlappingPair {
    fn new(key: PairKey) -> Self {
        Self {
            key,
            axis_bits: 0,
            manifold: None,
        }
    }

    /// Whether the AABBs currently overlap on all three axes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.axis_bits == ALL_AXES
    }
}

/// Pair activation events emitted by the broad phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairEvent {
    /// The pair's AABBs started overlapping on all three axes.
    Added(PairKey),
    /// The pair stopped overlapping; carries the manifold handle that was
    /// attached to it, if any, so the world can destroy it.
    Removed {
        /// The pair that went away.
        key: PairKey,
        /// The manifold that was attached to the pair.
        manifold: Option<usize>,
    },
}

/// Hash-indexed set of the currently overlapping pairs.
#[derive(Debug, Default)]
pub struct PairManager {
    index: HashMap<PairKey, usize>,
    records: Vec<OverlappingPair>,
    events: Vec<PairEvent>,
}

impl PairManager {
    /// Create an empty pair manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of candidate pairs (overlapping on at least one axis).
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.records.len()
    }

    /// Number of active pairs (overlapping on all three axes).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active()).count()
    }

    /// Look up a pair record.
    #[must_use]
    pub fn get(&self, key: PairKey) -> Option<&OverlappingPair> {
        self.index.get(&key).map(|&i| &self.records[i])
    }

    /// Look up a pair record mutably.
    pub fn get_mut(&mut self, key: PairKey) -> Option<&mut OverlappingPair> {
        let index = *self.index.get(&key)?;
        Some(&mut self.records[index])
    }

    /// Iterate over the active pairs.
    ///
    /// Order is the record insertion order and is stable within one
    /// broad-phase step.
    pub fn active_pairs(&self) -> impl Iterator<Item = &OverlappingPair> {
        self.records.iter().filter(|r| r.is_active())
    }

    /// Attach a manifold handle to an active pair.
    pub fn set_manifold(&mut self, key: PairKey, manifold: usize) {
        if let Some(record) = self.get_mut(key) {
            record.manifold = Some(manifold);
        }
    }

    /// Record an axis-overlap transition reported by the broad phase.
    ///
    /// Inserting is idempotent: a record is created the first time an axis
    /// bit is set for a key. When the record reaches all-three-axes overlap
    /// a [`PairEvent::Added`] is queued; when it drops out of all-three a
    /// [`PairEvent::Removed`] is queued and the manifold handle is released
    /// into the event.
    pub fn set_axis_overlap(&mut self, key: PairKey, axis: usize, overlapping: bool) {
        debug_assert!(axis < 3);
        let bit = 1u8 << axis;

        if overlapping {
            let record_index = match self.index.get(&key) {
                Some(&i) => i,
                None => {
                    let i = self.records.len();
                    self.records.push(OverlappingPair::new(key));
                    self.index.insert(key, i);
                    i
                }
            };
            let record = &mut self.records[record_index];
            let was_active = record.is_active();
            record.axis_bits |= bit;
            if !was_active && record.is_active() {
                self.events.push(PairEvent::Added(key));
            }
        } else if let Some(&record_index) = self.index.get(&key) {
            let record = &mut self.records[record_index];
            let was_active = record.is_active();
            record.axis_bits &= !bit;
            if was_active {
                let manifold = record.manifold.take();
                self.events.push(PairEvent::Removed { key, manifold });
            }
            if record.axis_bits == 0 {
                self.remove_record(record_index);
            }
        }
    }

    /// Drop every pair mentioning a body (the body is being removed).
    ///
    /// Active pairs are reported as [`PairEvent::Removed`].
    pub fn remove_all_with(&mut self, body: BodyId) {
        let mut index = 0;
        while index < self.records.len() {
            if self.records[index].key.contains(body) {
                let record = &mut self.records[index];
                if record.is_active() {
                    let manifold = record.manifold.take();
                    self.events.push(PairEvent::Removed {
                        key: record.key,
                        manifold,
                    });
                }
                self.remove_record(index);
            } else {
                index += 1;
            }
        }
    }

    /// Take the queued events, leaving the queue empty.
    #[must_use]
    pub fn drain_events(&mut self) -> Vec<PairEvent> {
        std::mem::take(&mut self.events)
    }

    /// Remove a record by index, keeping `index` consistent.
    fn remove_record(&mut self, record_index: usize) {
        let key = self.records[record_index].key;
        self.index.remove(&key);
        self.records.swap_remove(record_index);
        if record_index < self.records.len() {
            let moved_key = self.records[record_index].key;
            self.index.insert(moved_key, record_index);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn key(a: u32, b: u32) -> PairKey {
        PairKey::new(BodyId::new(a), BodyId::new(b))
    }

    #[test]
    fn test_key_is_canonical() {
        assert_eq!(key(3, 7), key(7, 3));
        assert_eq!(key(3, 7).first(), BodyId::new(3));
    }

    #[test]
    fn test_pair_activates_on_third_axis() {
        let mut pairs = PairManager::new();
        let k = key(0, 1);

        pairs.set_axis_overlap(k, 0, true);
        pairs.set_axis_overlap(k, 1, true);
        assert!(pairs.drain_events().is_empty(), "two axes are not enough");
        assert_eq!(pairs.active_count(), 0);

        pairs.set_axis_overlap(k, 2, true);
        assert_eq!(pairs.drain_events(), vec![PairEvent::Added(k)]);
        assert_eq!(pairs.active_count(), 1);
    }

    #[test]
    fn test_setting_same_axis_twice_is_idempotent() {
        let mut pairs = PairManager::new();
        let k = key(0, 1);

        for _ in 0..3 {
            pairs.set_axis_overlap(k, 0, true);
        }
        assert_eq!(pairs.candidate_count(), 1);
        assert!(pairs.drain_events().is_empty());
    }

    #[test]
    fn test_removal_returns_manifold() {
        let mut pairs = PairManager::new();
        let k = key(2, 5);
        for axis in 0..3 {
            pairs.set_axis_overlap(k, axis, true);
        }
        let _ = pairs.drain_events();
        pairs.set_manifold(k, 9);

        pairs.set_axis_overlap(k, 1, false);
        assert_eq!(
            pairs.drain_events(),
            vec![PairEvent::Removed {
                key: k,
                manifold: Some(9)
            }]
        );
        // Still a candidate on the other two axes
        assert_eq!(pairs.candidate_count(), 1);
        assert_eq!(pairs.active_count(), 0);
    }

    #[test]
    fn test_record_dropped_when_no_axis_overlaps() {
        let mut pairs = PairManager::new();
        let k = key(0, 1);
        pairs.set_axis_overlap(k, 0, true);
        pairs.set_axis_overlap(k, 0, false);
        assert_eq!(pairs.candidate_count(), 0);
    }

    #[test]
    fn test_remove_all_with_body() {
        let mut pairs = PairManager::new();
        for other in 1..4u32 {
            let k = key(0, other);
            for axis in 0..3 {
                pairs.set_axis_overlap(k, axis, true);
            }
        }
        // An unrelated pair survives
        let unrelated = key(5, 6);
        pairs.set_axis_overlap(unrelated, 0, true);
        let _ = pairs.drain_events();

        pairs.remove_all_with(BodyId::new(0));
        let events = pairs.drain_events();
        assert_eq!(events.len(), 3);
        assert_eq!(pairs.candidate_count(), 1);
        assert!(pairs.get(unrelated).is_some());
    }
}
