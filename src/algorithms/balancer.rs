use std::sync::atomic::{AtomicUsize, Ordering};

use crate::algorithms::Refine;
use crate::concurrent::ConcurrentFastResetArray;
use crate::config::{BalancerConfig, BalancingAlgorithm};
use crate::gain::{DeltaGainCache, GainCache, OnTheFlyGainCache};
use crate::heap::IndexedMaxHeap;
use crate::partition::{DeltaPartition, PartitionContext, PartitionedGraph};

// node_to_set stores set id + 1; zero means unassigned.
const UNASSIGNED: usize = 0;

/// Restores block-weight feasibility by moving whole sets of nodes.
///
/// Sets are grown by a best-connectivity BFS from seeds in overloaded blocks,
/// truncated to the prefix with the strongest connection to some other block,
/// then moved greedily in order of relative gain (absolute gain per unit
/// weight) while the target has capacity.
pub struct GreedyBalancer {
    config: BalancerConfig,
    algorithm: BalancingAlgorithm,
    node_to_set: ConcurrentFastResetArray<AtomicUsize>,
}

// One grown move set: nodes `sets[begin..end]`, all in block `from`.
struct MoveSet {
    from: usize,
    to: usize,
    weight: i64,
    gain: i64,
    begin: usize,
    end: usize,
}

impl GreedyBalancer {
    pub fn new(config: BalancerConfig, algorithm: BalancingAlgorithm) -> Self {
        Self {
            config,
            algorithm,
            node_to_set: ConcurrentFastResetArray::new(0),
        }
    }

    /// Moves sets until every block fits its cap or no candidate is left.
    /// `cache` is kept up to date for every committed move. Returns the
    /// total overload that was removed.
    pub fn balance(
        &mut self,
        p_graph: &PartitionedGraph,
        p_ctx: &PartitionContext,
        cache: Option<&GainCache>,
    ) -> i64 {
        let initial_overload = p_graph.total_overload(p_ctx);
        if initial_overload == 0 {
            return 0;
        }

        if self.node_to_set.capacity() < p_graph.n() {
            self.node_to_set = ConcurrentFastResetArray::new(p_graph.n());
        }

        loop {
            let before = p_graph.total_overload(p_ctx);
            let moved = self.round(p_graph, p_ctx, cache);
            let after = p_graph.total_overload(p_ctx);
            // zero-weight sets can move without reducing any overload
            if !moved || after == 0 || after >= before {
                break;
            }
        }

        let removed = initial_overload - p_graph.total_overload(p_ctx);
        log::debug!(
            "balancer removed {removed} of {initial_overload} overload, imbalance now {:.4}",
            p_graph.imbalance()
        );
        removed
    }

    fn round(
        &mut self,
        p_graph: &PartitionedGraph,
        p_ctx: &PartitionContext,
        cache: Option<&GainCache>,
    ) -> bool {
        let max_set_weight = self.max_move_set_weight(p_graph, p_ctx);
        let mut builder = MoveSetBuilder::new(p_graph, p_ctx, &mut self.node_to_set);
        let (candidates, sets) = builder.build(max_set_weight, self.algorithm);

        // Best relative gain first; ties go to the less overloaded target.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            let ca = &candidates[a];
            let cb = &candidates[b];
            let rel_a = ca.gain as f64 / ca.weight.max(1) as f64;
            let rel_b = cb.gain as f64 / cb.weight.max(1) as f64;
            rel_b
                .partial_cmp(&rel_a)
                .unwrap()
                .then_with(|| {
                    let overload_a = p_ctx.overload(ca.to, p_graph.block_weight(ca.to));
                    let overload_b = p_ctx.overload(cb.to, p_graph.block_weight(cb.to));
                    overload_a.cmp(&overload_b)
                })
        });

        let fallback_cache = GainCache::OnTheFly(OnTheFlyGainCache::new(p_graph.k()));
        let eval_cache = cache.unwrap_or(&fallback_cache);

        let mut moved_any = false;
        for i in order {
            let candidate = &candidates[i];
            if p_ctx.overload(candidate.from, p_graph.block_weight(candidate.from)) == 0 {
                continue;
            }
            if p_graph.block_weight(candidate.to) + candidate.weight
                > p_ctx.max_block_weight(candidate.to)
            {
                continue;
            }

            let members = &sets[candidate.begin..candidate.end];

            // Re-evaluate against the current partition before committing:
            // earlier candidates may have changed the neighborhood.
            let mut d_graph = DeltaPartition::new(p_graph);
            let mut d_cache = DeltaGainCache::new(eval_cache);
            let mut actual_gain = 0;
            for &u in members {
                actual_gain += d_cache.gain(&d_graph, u, candidate.from, candidate.to);
                d_cache.move_node(&d_graph, u, candidate.from, candidate.to);
                d_graph.set_block(u, candidate.to);
            }
            if actual_gain < candidate.gain {
                log::trace!(
                    "move set of weight {} degraded from gain {} to {actual_gain}",
                    candidate.weight,
                    candidate.gain
                );
            }

            for &u in members {
                p_graph.set_block(u, candidate.to);
                if let Some(cache) = cache {
                    cache.move_node(p_graph, u, candidate.from, candidate.to);
                }
            }
            moved_any = true;
        }

        self.node_to_set.clear();
        moved_any
    }

    fn max_move_set_weight(&self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) -> i64 {
        if self.config.max_move_set_weight > 0 {
            return self.config.max_move_set_weight;
        }
        (0..p_graph.k())
            .map(|b| p_ctx.overload(b, p_graph.block_weight(b)))
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

impl Refine for GreedyBalancer {
    fn initialize(&mut self, _p_graph: &PartitionedGraph, _p_ctx: &PartitionContext) {}

    fn refine(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) -> bool {
        let initial_cut = p_graph.edge_cut();
        self.balance(p_graph, p_ctx, None);
        debug_assert!(p_graph.validate());
        p_graph.edge_cut() < initial_cut
    }
}

struct MoveSetBuilder<'a, 'g> {
    p_graph: &'a PartitionedGraph<'g>,
    p_ctx: &'a PartitionContext,
    node_to_set: &'a mut ConcurrentFastResetArray<AtomicUsize>,
    touched: Vec<usize>,
    sets: Vec<usize>,
    candidates: Vec<MoveSet>,
    frontier: IndexedMaxHeap,
    cur_conns: IndexedMaxHeap,
    cur_set: usize,
    cur_block: usize,
    cur_pos: usize,
    cur_weight: i64,
    cur_block_conn: i64,
    best_prefix_pos: usize,
    best_prefix_block: usize,
    best_prefix_conn: i64,
    best_prefix_block_conn: i64,
}

impl<'a, 'g> MoveSetBuilder<'a, 'g> {
    fn new(
        p_graph: &'a PartitionedGraph<'g>,
        p_ctx: &'a PartitionContext,
        node_to_set: &'a mut ConcurrentFastResetArray<AtomicUsize>,
    ) -> Self {
        Self {
            p_graph,
            p_ctx,
            node_to_set,
            touched: Vec::new(),
            sets: Vec::new(),
            candidates: Vec::new(),
            frontier: IndexedMaxHeap::new(p_graph.n()),
            cur_conns: IndexedMaxHeap::new(p_graph.k()),
            cur_set: 0,
            cur_block: 0,
            cur_pos: 0,
            cur_weight: 0,
            cur_block_conn: 0,
            best_prefix_pos: 0,
            best_prefix_block: usize::MAX,
            best_prefix_conn: 0,
            best_prefix_block_conn: 0,
        }
    }

    fn build(
        &mut self,
        max_set_weight: i64,
        algorithm: BalancingAlgorithm,
    ) -> (Vec<MoveSet>, Vec<usize>) {
        let p_graph = self.p_graph;
        for u in 0..p_graph.n() {
            let block = p_graph.block(u);
            if p_ctx_overloaded(self.p_ctx, p_graph, block) && self.set_of(u) == UNASSIGNED {
                self.grow_move_set(u, max_set_weight, algorithm);
            }
        }

        self.node_to_set.set_used_entries(std::mem::take(&mut self.touched));
        (std::mem::take(&mut self.candidates), std::mem::take(&mut self.sets))
    }

    fn set_of(&self, u: usize) -> usize {
        self.node_to_set.get(u).load(Ordering::Relaxed)
    }

    fn grow_move_set(&mut self, seed: usize, max_weight: i64, algorithm: BalancingAlgorithm) {
        let p_graph = self.p_graph;
        self.cur_block = p_graph.block(seed);
        self.cur_weight = 0;
        self.cur_block_conn = 0;
        self.best_prefix_pos = self.cur_pos;
        self.best_prefix_block = usize::MAX;
        self.best_prefix_conn = i64::MIN;
        self.best_prefix_block_conn = 0;

        self.frontier.clear();
        self.cur_conns.clear();
        for b in (0..p_graph.k()).filter(|&b| b != self.cur_block) {
            self.cur_conns.push(b, 0);
        }

        self.frontier.push(seed, 0);
        while self.cur_weight < max_weight {
            let Some((u, _)) = self.frontier.pop() else {
                break;
            };
            self.add_to_move_set(u);

            if algorithm == BalancingAlgorithm::SingleNodes {
                break;
            }

            let graph = p_graph.graph();
            for (e, v) in graph.neighbors(u) {
                if v != u
                    && p_graph.block(v) == self.cur_block
                    && self.set_of(v) == UNASSIGNED
                {
                    if self.frontier.contains(v) {
                        self.frontier.change_priority_by(v, graph.edge_weight(e));
                    } else {
                        self.frontier.push(v, graph.edge_weight(e));
                    }
                }
            }
        }

        self.finish_move_set();
    }

    fn add_to_move_set(&mut self, u: usize) {
        let p_graph = self.p_graph;
        let graph = p_graph.graph();

        self.cur_weight += graph.node_weight(u);
        self.node_to_set.get(u).store(self.cur_set + 1, Ordering::Relaxed);
        self.touched.push(u);
        if self.cur_pos == self.sets.len() {
            self.sets.push(u);
        } else {
            self.sets[self.cur_pos] = u;
        }
        self.cur_pos += 1;

        for (e, v) in graph.neighbors(u) {
            if v == u {
                continue;
            }
            let weight = graph.edge_weight(e);
            if self.set_of(v) == self.cur_set + 1 {
                self.cur_block_conn -= weight;
            } else {
                let bv = p_graph.block(v);
                if bv == self.cur_block {
                    self.cur_block_conn += weight;
                } else {
                    self.cur_conns.change_priority_by(bv, weight);
                }
            }
        }

        if let Some((block, conn)) = self.cur_conns.peek() {
            if conn >= self.best_prefix_conn {
                self.best_prefix_block = block;
                self.best_prefix_conn = conn;
                self.best_prefix_block_conn = self.cur_block_conn;
                self.best_prefix_pos = self.cur_pos;
            }
        }
    }

    fn finish_move_set(&mut self) {
        let begin = self.candidates.last().map_or(0, |c| c.end);

        // Drop everything past the best prefix.
        for pos in self.best_prefix_pos..self.cur_pos {
            self.node_to_set.get(self.sets[pos]).store(UNASSIGNED, Ordering::Relaxed);
        }
        self.cur_pos = self.best_prefix_pos;

        if self.cur_pos > begin && self.best_prefix_block != usize::MAX {
            let weight: i64 = self.sets[begin..self.cur_pos]
                .iter()
                .map(|&u| self.p_graph.graph().node_weight(u))
                .sum();
            self.candidates.push(MoveSet {
                from: self.cur_block,
                to: self.best_prefix_block,
                weight,
                gain: self.best_prefix_conn - self.best_prefix_block_conn,
                begin,
                end: self.cur_pos,
            });
            self.cur_set += 1;
        } else {
            // nothing kept: unassign the whole attempt
            for pos in begin..self.cur_pos {
                self.node_to_set.get(self.sets[pos]).store(UNASSIGNED, Ordering::Relaxed);
            }
            self.cur_pos = begin;
        }
    }
}

fn p_ctx_overloaded(p_ctx: &PartitionContext, p_graph: &PartitionedGraph, block: usize) -> bool {
    p_graph.block_weight(block) > p_ctx.max_block_weight(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::Graph;

    fn path8() -> Graph {
        let mut builder = GraphBuilder::new(8);
        for u in 0..7 {
            builder.add_edge(u, u + 1, 1);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_repairs_overloaded_block() {
        let graph = path8();
        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 0, 0, 0, 0, 0, 1, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());
        assert_eq!(p_graph.block_weight(0), 6);

        let mut balancer =
            GreedyBalancer::new(BalancerConfig::default(), BalancingAlgorithm::MoveSets);
        balancer.balance(&p_graph, &p_ctx, None);

        assert!(p_graph.is_feasible(&p_ctx));
        assert!(p_graph.edge_cut() <= 4, "cut {} worse than a trivial split", p_graph.edge_cut());
        assert!(p_graph.validate());
    }

    #[test]
    fn test_prefers_connected_targets() {
        // Two overloaded-block nodes hang off block 1; moving them there is
        // strictly better than moving interior nodes.
        let mut builder = GraphBuilder::new(6);
        builder.add_edge(0, 1, 10);
        builder.add_edge(1, 2, 10);
        builder.add_edge(2, 3, 10);
        builder.add_edge(3, 4, 1);
        builder.add_edge(4, 5, 10);
        let graph = builder.build().unwrap();

        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 0, 0, 0, 1, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());

        let mut balancer =
            GreedyBalancer::new(BalancerConfig::default(), BalancingAlgorithm::MoveSets);
        balancer.balance(&p_graph, &p_ctx, None);

        assert!(p_graph.is_feasible(&p_ctx));
        // node 3 is the cheapest node to evict from block 0
        assert_eq!(p_graph.block(3), 1);
    }

    #[test]
    fn test_single_node_mode() {
        let graph = path8();
        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 0, 0, 0, 0, 0, 1, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());

        let mut balancer =
            GreedyBalancer::new(BalancerConfig::default(), BalancingAlgorithm::SingleNodes);
        balancer.balance(&p_graph, &p_ctx, None);

        assert!(p_graph.is_feasible(&p_ctx));
    }

    #[test]
    fn test_noop_when_feasible() {
        let graph = path8();
        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());
        let before = p_graph.snapshot();

        let mut balancer =
            GreedyBalancer::new(BalancerConfig::default(), BalancingAlgorithm::MoveSets);
        balancer.balance(&p_graph, &p_ctx, None);

        assert_eq!(p_graph.snapshot(), before);
    }
}
