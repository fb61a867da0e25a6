//! Incremental sweep-and-prune broad phase.
//!
//! Three sorted endpoint arrays (one per world axis) each hold two endpoints
//! per body. When a body's AABB changes, its endpoints are moved to their new
//! positions by adjacent bubble swaps; every swap of a min endpoint past
//! another body's max endpoint (or vice versa) is exactly one axis-overlap
//! transition for that pair and is reported to the [`PairManager`].
//!
//! Moving endpoints one adjacent swap at a time is what makes a single bit
//! per axis sufficient: when a crossing establishes one of the two interval
//! inequalities, the other one is implied by the current endpoint order.
//!
//! Amortized cost is O(N + k) per step when bodies move coherently, which is
//! the typical case in game scenes.

use hashbrown::HashMap;
use rigid_types::BodyId;

use crate::aabb::Aabb;
use crate::pair::{PairKey, PairManager};

/// One endpoint of a body's interval on one axis.
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    value: f64,
    body: BodyId,
    is_max: bool,
}

/// Per-body bookkeeping: current AABB and endpoint positions per axis.
#[derive(Debug, Clone, Copy)]
struct Proxy {
    aabb: Aabb,
    min_index: [usize; 3],
    max_index: [usize; 3],
}

/// Sweep-and-prune spatial index over body AABBs.
#[derive(Debug, Default)]
pub struct SweepAndPrune {
    axes: [Vec<Endpoint>; 3],
    proxies: HashMap<BodyId, Proxy>,
}

/// Sorted-order predicate: `a` must come before `b`.
///
/// Ties are broken min-before-max so that touching intervals count as
/// overlapping, matching [`Aabb::overlaps`]' closed intervals.
fn out_of_order(a: &Endpoint, b: &Endpoint) -> bool {
    a.value > b.value || (a.value == b.value && a.is_max && !b.is_max)
}

impl SweepAndPrune {
    /// Create an empty broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Check if no bodies are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// The AABB currently stored for a body.
    #[must_use]
    pub fn aabb(&self, body: BodyId) -> Option<&Aabb> {
        self.proxies.get(&body).map(|p| &p.aabb)
    }

    /// Start tracking a body.
    ///
    /// Axis-overlap bits against every existing body are established by
    /// direct interval comparison; pairs reaching full overlap are reported
    /// through the pair manager's event queue.
    pub fn add(&mut self, body: BodyId, aabb: Aabb, pairs: &mut PairManager) {
        debug_assert!(!self.proxies.contains_key(&body), "body added twice");

        for (&other, proxy) in &self.proxies {
            let key = PairKey::new(body, other);
            for axis in 0..3 {
                if aabb.overlaps_on_axis(&proxy.aabb, axis) {
                    pairs.set_axis_overlap(key, axis, true);
                }
            }
        }

        self.proxies.insert(
            body,
            Proxy {
                aabb,
                min_index: [0; 3],
                max_index: [0; 3],
            },
        );

        for axis in 0..3 {
            self.insert_endpoint(
                axis,
                Endpoint {
                    value: aabb.min_on_axis(axis),
                    body,
                    is_max: false,
                },
            );
            self.insert_endpoint(
                axis,
                Endpoint {
                    value: aabb.max_on_axis(axis),
                    body,
                    is_max: true,
                },
            );
            self.reindex_axis(axis);
        }
    }

    /// Stop tracking a body, dropping every pair that mentions it.
    pub fn remove(&mut self, body: BodyId, pairs: &mut PairManager) {
        if self.proxies.remove(&body).is_none() {
            return;
        }
        pairs.remove_all_with(body);
        for axis in 0..3 {
            self.axes[axis].retain(|ep| ep.body != body);
            self.reindex_axis(axis);
        }
    }

    /// Move a body's AABB, recomputing overlaps incrementally.
    pub fn update(&mut self, body: BodyId, aabb: Aabb, pairs: &mut PairManager) {
        let Some(proxy) = self.proxies.get(&body).copied() else {
            return;
        };

        for axis in 0..3 {
            let new_min = aabb.min_on_axis(axis);
            let new_max = aabb.max_on_axis(axis);
            // Ordering keeps a body's min endpoint strictly left of its max:
            // when the interval moves right, lead with the max endpoint.
            if new_min >= proxy.aabb.min_on_axis(axis) {
                self.move_endpoint(axis, body, true, new_max, pairs);
                self.move_endpoint(axis, body, false, new_min, pairs);
            } else {
                self.move_endpoint(axis, body, false, new_min, pairs);
                self.move_endpoint(axis, body, true, new_max, pairs);
            }
        }

        if let Some(proxy) = self.proxies.get_mut(&body) {
            proxy.aabb = aabb;
        }
    }

    /// Insert an endpoint at its sorted position.
    fn insert_endpoint(&mut self, axis: usize, endpoint: Endpoint) {
        let position = self.axes[axis].partition_point(|ep| !out_of_order(ep, &endpoint));
        self.axes[axis].insert(position, endpoint);
    }

    /// Rewrite the stored endpoint indices for a whole axis.
    fn reindex_axis(&mut self, axis: usize) {
        let endpoints = &self.axes[axis];
        for (index, endpoint) in endpoints.iter().enumerate() {
            if let Some(proxy) = self.proxies.get_mut(&endpoint.body) {
                if endpoint.is_max {
                    proxy.max_index[axis] = index;
                } else {
                    proxy.min_index[axis] = index;
                }
            }
        }
    }

    /// Move one endpoint to a new value with bubble swaps, reporting each
    /// min/max crossing as an axis-overlap transition.
    fn move_endpoint(
        &mut self,
        axis: usize,
        body: BodyId,
        is_max: bool,
        new_value: f64,
        pairs: &mut PairManager,
    ) {
        let Some(proxy) = self.proxies.get(&body) else {
            return;
        };
        let mut index = if is_max {
            proxy.max_index[axis]
        } else {
            proxy.min_index[axis]
        };
        self.axes[axis][index].value = new_value;

        // Bubble left
        while index > 0 && out_of_order(&self.axes[axis][index - 1], &self.axes[axis][index]) {
            let moving = self.axes[axis][index];
            let passed = self.axes[axis][index - 1];
            if moving.body != passed.body {
                let key = PairKey::new(moving.body, passed.body);
                if !moving.is_max && passed.is_max {
                    // A min moved left of another body's max: overlap begins.
                    pairs.set_axis_overlap(key, axis, true);
                } else if moving.is_max && !passed.is_max {
                    // A max moved left of another body's min: overlap ends.
                    pairs.set_axis_overlap(key, axis, false);
                }
            }
            self.axes[axis].swap(index - 1, index);
            self.store_index(axis, index - 1);
            self.store_index(axis, index);
            index -= 1;
        }

        // Bubble right
        while index + 1 < self.axes[axis].len()
            && out_of_order(&self.axes[axis][index], &self.axes[axis][index + 1])
        {
            let moving = self.axes[axis][index];
            let passed = self.axes[axis][index + 1];
            if moving.body != passed.body {
                let key = PairKey::new(moving.body, passed.body);
                if !moving.is_max && passed.is_max {
                    // A min moved right of another body's max: overlap ends.
                    pairs.set_axis_overlap(key, axis, false);
                } else if moving.is_max && !passed.is_max {
                    // A max moved right of another body's min: overlap begins.
                    pairs.set_axis_overlap(key, axis, true);
                }
            }
            self.axes[axis].swap(index, index + 1);
            self.store_index(axis, index);
            self.store_index(axis, index + 1);
            index += 1;
        }
    }

    /// Record the position of the endpoint currently at `index`.
    fn store_index(&mut self, axis: usize, index: usize) {
        let endpoint = self.axes[axis][index];
        if let Some(proxy) = self.proxies.get_mut(&endpoint.body) {
            if endpoint.is_max {
                proxy.max_index[axis] = index;
            } else {
                proxy.min_index[axis] = index;
            }
        }
    }
}
