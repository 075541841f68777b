use crate::concurrent::RatingMap;
use crate::gain::MaxGainer;
use crate::partition::{DeltaPartition, PartitionedGraph};

/// Stateless gain cache for graphs where `n * k` cells would be too large to
/// allocate: every query walks the adjacency of the node instead.
pub struct OnTheFlyGainCache {
    k: usize,
}

impl OnTheFlyGainCache {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn gain(&self, p_graph: &PartitionedGraph, u: usize, from: usize, to: usize) -> i64 {
        let graph = p_graph.graph();
        let mut conn_from = 0;
        let mut conn_to = 0;
        for (e, v) in graph.neighbors(u) {
            let block = p_graph.block(v);
            if block == from {
                conn_from += graph.edge_weight(e);
            } else if block == to {
                conn_to += graph.edge_weight(e);
            }
        }
        conn_to - conn_from
    }

    /// Same as [`gain`](OnTheFlyGainCache::gain), but against the blocks of a
    /// delta overlay.
    pub fn gain_in_delta(&self, delta: &DeltaPartition, u: usize, from: usize, to: usize) -> i64 {
        let graph = delta.base().graph();
        let mut conn_from = 0;
        let mut conn_to = 0;
        for (e, v) in graph.neighbors(u) {
            let block = delta.block(v);
            if block == from {
                conn_from += graph.edge_weight(e);
            } else if block == to {
                conn_to += graph.edge_weight(e);
            }
        }
        conn_to - conn_from
    }

    pub fn conn(&self, p_graph: &PartitionedGraph, u: usize, block: usize) -> i64 {
        let graph = p_graph.graph();
        graph
            .neighbors(u)
            .filter(|&(_, v)| p_graph.block(v) == block)
            .map(|(e, _)| graph.edge_weight(e))
            .sum()
    }

    pub fn is_border_node(&self, p_graph: &PartitionedGraph, u: usize, block: usize) -> bool {
        p_graph
            .graph()
            .neighbors(u)
            .any(|(_, v)| p_graph.block(v) != block)
    }

    pub fn max_gainer(
        &self,
        p_graph: &PartitionedGraph,
        u: usize,
        map: &mut RatingMap,
    ) -> MaxGainer {
        let graph = p_graph.graph();
        let from = p_graph.block(u);

        map.update_upper_bound(graph.degree(u).min(self.k));
        for (e, v) in graph.neighbors(u) {
            map.add(p_graph.block(v), graph.edge_weight(e));
        }

        let mut best_block = from;
        let mut best_conn = 0;
        map.for_each(|block, conn| {
            if block != from && (conn > best_conn || (conn == best_conn && block < best_block)) {
                best_block = block;
                best_conn = conn;
            }
        });
        let int_degree = map.get(from);
        map.clear();

        MaxGainer {
            block: best_block,
            int_degree,
            ext_degree: best_conn,
        }
    }
}
