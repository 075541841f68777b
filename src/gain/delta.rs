use rustc_hash::FxHashMap;

use crate::gain::GainCache;
use crate::partition::DeltaPartition;

/// Overlay for "try before commit" gain queries: moves recorded here update a
/// small map keyed by the parent cache's `index(v, b)` instead of the shared
/// cells, and [`clear`](DeltaGainCache::clear) discards everything.
///
/// Over an on-the-fly parent there is nothing to overlay; queries recompute
/// against the delta partition instead.
pub struct DeltaGainCache<'a> {
    base: &'a GainCache,
    delta: FxHashMap<usize, i64>,
}

impl<'a> DeltaGainCache<'a> {
    pub fn new(base: &'a GainCache) -> Self {
        Self {
            base,
            delta: FxHashMap::default(),
        }
    }

    pub fn gain(&self, d_graph: &DeltaPartition, u: usize, from: usize, to: usize) -> i64 {
        match self.base {
            GainCache::Dense(cache) => {
                let delta_to = self.delta.get(&cache.index(u, to)).copied().unwrap_or(0);
                let delta_from = self.delta.get(&cache.index(u, from)).copied().unwrap_or(0);
                cache.gain(u, from, to) + delta_to - delta_from
            }
            GainCache::OnTheFly(cache) => cache.gain_in_delta(d_graph, u, from, to),
        }
    }

    /// Records the move of `u` in the overlay only; the parent cache is left
    /// untouched.
    pub fn move_node(&mut self, d_graph: &DeltaPartition, u: usize, from: usize, to: usize) {
        let GainCache::Dense(cache) = self.base else {
            return;
        };
        let graph = d_graph.base().graph();
        for (e, v) in graph.neighbors(u) {
            let weight = graph.edge_weight(e);
            *self.delta.entry(cache.index(v, from)).or_insert(0) -= weight;
            *self.delta.entry(cache.index(v, to)).or_insert(0) += weight;
        }
    }

    pub fn clear(&mut self) {
        self.delta.clear();
    }
}
