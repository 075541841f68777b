// Gain caches answer "how does the cut change if u moves from a to b".

mod delta;
mod dense;
mod on_the_fly;

pub use delta::DeltaGainCache;
pub use dense::DenseGainCache;
pub use on_the_fly::OnTheFlyGainCache;

use crate::concurrent::RatingMap;
use crate::partition::PartitionedGraph;

/// Best move target of a node, together with its internal and external
/// weighted degrees.
#[derive(Clone, Copy, Debug)]
pub struct MaxGainer {
    pub block: usize,
    pub int_degree: i64,
    pub ext_degree: i64,
}

impl MaxGainer {
    pub fn absolute_gain(&self) -> i64 {
        self.ext_degree - self.int_degree
    }
}

/// Closed dispatch between the two cache implementations; chosen once per
/// refinement level.
pub enum GainCache {
    Dense(DenseGainCache),
    OnTheFly(OnTheFlyGainCache),
}

impl GainCache {
    /// Picks the dense cache while its `n * k` cells stay below
    /// `max_dense_cells`, the stateless cache beyond.
    pub fn for_graph(n: usize, k: usize, max_dense_cells: usize) -> Self {
        match n.checked_mul(k) {
            Some(cells) if cells <= max_dense_cells => {
                GainCache::Dense(DenseGainCache::new(n, k))
            }
            _ => GainCache::OnTheFly(OnTheFlyGainCache::new(k)),
        }
    }

    pub fn initialize(&mut self, p_graph: &PartitionedGraph) {
        if let GainCache::Dense(cache) = self {
            cache.initialize(p_graph);
        }
    }

    pub fn gain(&self, p_graph: &PartitionedGraph, u: usize, from: usize, to: usize) -> i64 {
        match self {
            GainCache::Dense(cache) => cache.gain(u, from, to),
            GainCache::OnTheFly(cache) => cache.gain(p_graph, u, from, to),
        }
    }

    /// Weighted degree of `u` into `block`.
    pub fn conn(&self, p_graph: &PartitionedGraph, u: usize, block: usize) -> i64 {
        match self {
            GainCache::Dense(cache) => cache.conn(u, block),
            GainCache::OnTheFly(cache) => cache.conn(p_graph, u, block),
        }
    }

    pub fn is_border_node(&self, p_graph: &PartitionedGraph, u: usize, block: usize) -> bool {
        match self {
            GainCache::Dense(cache) => cache.is_border_node(u, block),
            GainCache::OnTheFly(cache) => cache.is_border_node(p_graph, u, block),
        }
    }

    /// Records the move of `u` in the cached weighted degrees of its
    /// neighbors. Relaxed per-cell updates: concurrent moves may leave the
    /// cache transiently inconsistent, which the JET filter phase tolerates
    /// by re-validating with projected gains.
    pub fn move_node(&self, p_graph: &PartitionedGraph, u: usize, from: usize, to: usize) {
        if let GainCache::Dense(cache) = self {
            cache.move_node(p_graph, u, from, to);
        }
    }

    /// Highest-gain target block of `u`. `map` is the calling thread's
    /// scratch rating map.
    pub fn max_gainer(
        &self,
        p_graph: &PartitionedGraph,
        u: usize,
        map: &mut RatingMap,
    ) -> MaxGainer {
        match self {
            GainCache::Dense(cache) => cache.max_gainer(p_graph, u),
            GainCache::OnTheFly(cache) => cache.max_gainer(p_graph, u, map),
        }
    }

    /// Recomputes the cache from scratch and compares. Debug only.
    pub fn validate(&self, p_graph: &PartitionedGraph) -> bool {
        match self {
            GainCache::Dense(cache) => cache.validate(p_graph),
            GainCache::OnTheFly(_) => true,
        }
    }

    pub fn k(&self) -> usize {
        match self {
            GainCache::Dense(cache) => cache.k(),
            GainCache::OnTheFly(cache) => cache.k(),
        }
    }
}
