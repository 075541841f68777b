use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::graph::Graph;

/// Derived partition parameters: the number of blocks and the per-block
/// weight capacity `(1 + eps) * ceil(total_node_weight / k)`.
#[derive(Clone, Debug)]
pub struct PartitionContext {
    pub k: usize,
    pub epsilon: f64,
    pub total_node_weight: i64,
    pub perfect_block_weight: i64,
    max_block_weights: Vec<i64>,
}

impl PartitionContext {
    pub fn new(k: usize, epsilon: f64, total_node_weight: i64) -> Self {
        assert!(k >= 2, "need at least two blocks");
        assert!(epsilon >= 0.0, "imbalance tolerance must not be negative");

        let k_i64 = k as i64;
        let perfect_block_weight = (total_node_weight + k_i64 - 1) / k_i64;
        let cap = ((1.0 + epsilon) * perfect_block_weight as f64).floor() as i64;
        Self {
            k,
            epsilon,
            total_node_weight,
            perfect_block_weight,
            max_block_weights: vec![cap; k],
        }
    }

    pub fn max_block_weight(&self, b: usize) -> i64 {
        self.max_block_weights[b]
    }

    pub fn overload(&self, b: usize, weight: i64) -> i64 {
        (weight - self.max_block_weight(b)).max(0)
    }
}

/// A graph together with a mutable k-way partition of its nodes.
///
/// Block assignments and block weights are atomics so refiners can move nodes
/// from many threads; all operations use relaxed ordering (per-entry eventual
/// consistency, re-validated by the refiners).
pub struct PartitionedGraph<'g> {
    graph: &'g Graph,
    k: usize,
    partition: Vec<AtomicUsize>,
    block_weights: Vec<AtomicI64>,
}

impl<'g> PartitionedGraph<'g> {
    pub fn new(graph: &'g Graph, k: usize, partition: Vec<usize>) -> Self {
        assert_eq!(partition.len(), graph.n());
        assert!(partition.iter().all(|&b| b < k), "partition not total");

        let mut block_weights = vec![0_i64; k];
        for (u, &b) in partition.iter().enumerate() {
            block_weights[b] += graph.node_weight(u);
        }

        Self {
            graph,
            k,
            partition: partition.into_iter().map(AtomicUsize::new).collect(),
            block_weights: block_weights.into_iter().map(AtomicI64::new).collect(),
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n(&self) -> usize {
        self.graph.n()
    }

    pub fn block(&self, u: usize) -> usize {
        self.partition[u].load(Ordering::Relaxed)
    }

    /// Moves `u` to `block` and maintains the block weights.
    pub fn set_block(&self, u: usize, block: usize) {
        let old = self.partition[u].swap(block, Ordering::Relaxed);
        if old != block {
            let weight = self.graph.node_weight(u);
            self.block_weights[old].fetch_sub(weight, Ordering::Relaxed);
            self.block_weights[block].fetch_add(weight, Ordering::Relaxed);
        }
    }

    /// Stores the block assignment without touching block weights; callers
    /// account for the weight change themselves (the JET execute phase).
    pub fn set_block_unchecked(&self, u: usize, block: usize) {
        self.partition[u].store(block, Ordering::Relaxed);
    }

    pub fn block_weight(&self, b: usize) -> i64 {
        self.block_weights[b].load(Ordering::Relaxed)
    }

    /// Shifts `weight` from block `from` to block `to` unless that would push
    /// `to` above `max_to`. The target update is a CAS loop, so concurrent
    /// movers cannot overshoot the cap together.
    pub fn try_move_block_weight(&self, from: usize, to: usize, weight: i64, max_to: i64) -> bool {
        let mut current = self.block_weights[to].load(Ordering::Relaxed);
        loop {
            if current + weight > max_to {
                return false;
            }
            match self.block_weights[to].compare_exchange_weak(
                current,
                current + weight,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.block_weights[from].fetch_sub(weight, Ordering::Relaxed);
        true
    }

    /// Unconditionally shifts `weight` between block weights; used for repair
    /// moves out of infeasible blocks.
    pub fn move_block_weight(&self, from: usize, to: usize, weight: i64) {
        self.block_weights[from].fetch_sub(weight, Ordering::Relaxed);
        self.block_weights[to].fetch_add(weight, Ordering::Relaxed);
    }

    pub fn add_block_weight(&self, b: usize, delta: i64) {
        self.block_weights[b].fetch_add(delta, Ordering::Relaxed);
    }

    /// Copies the current assignment into a plain vector.
    pub fn snapshot(&self) -> Vec<usize> {
        self.partition
            .par_iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    /// Overwrites the assignment and recomputes the block weights.
    pub fn restore(&self, partition: &[usize]) {
        assert_eq!(partition.len(), self.n());
        self.partition
            .par_iter()
            .zip(partition)
            .for_each(|(slot, &b)| slot.store(b, Ordering::Relaxed));

        let mut weights = vec![0_i64; self.k];
        for (u, &b) in partition.iter().enumerate() {
            weights[b] += self.graph.node_weight(u);
        }
        for (slot, weight) in self.block_weights.iter().zip(weights) {
            slot.store(weight, Ordering::Relaxed);
        }
    }

    /// Total weight of edges crossing block boundaries. Each undirected edge
    /// is stored as two half-edges, hence the halving.
    pub fn edge_cut(&self) -> i64 {
        let cut: i64 = (0..self.n())
            .into_par_iter()
            .map(|u| {
                let block = self.block(u);
                self.graph
                    .neighbors(u)
                    .filter(|&(_, v)| self.block(v) != block)
                    .map(|(e, _)| self.graph.edge_weight(e))
                    .sum::<i64>()
            })
            .sum();
        debug_assert_eq!(cut % 2, 0);
        cut / 2
    }

    /// Maximum relative overload over all blocks.
    pub fn imbalance(&self) -> f64 {
        let perfect = self.graph.total_node_weight() as f64 / self.k as f64;
        if perfect == 0.0 {
            return 0.0;
        }
        (0..self.k)
            .map(|b| (self.block_weight(b) as f64 - perfect) / perfect)
            .fold(0.0_f64, f64::max)
    }

    pub fn is_feasible(&self, p_ctx: &PartitionContext) -> bool {
        (0..self.k).all(|b| self.block_weight(b) <= p_ctx.max_block_weight(b))
    }

    pub fn total_overload(&self, p_ctx: &PartitionContext) -> i64 {
        (0..self.k)
            .map(|b| p_ctx.overload(b, self.block_weight(b)))
            .sum()
    }

    /// Checks the block-weight bookkeeping against a recount. Debug only.
    pub fn validate(&self) -> bool {
        let mut weights = vec![0_i64; self.k];
        for u in 0..self.n() {
            let b = self.block(u);
            if b >= self.k {
                return false;
            }
            weights[b] += self.graph.node_weight(u);
        }
        (0..self.k).all(|b| weights[b] == self.block_weight(b))
    }
}

/// Sparse overlay over a [`PartitionedGraph`] for speculative move
/// evaluation: block overrides plus block-weight deltas, discarded on
/// [`clear`](DeltaPartition::clear). The overlay does not own the base graph.
pub struct DeltaPartition<'a, 'g> {
    base: &'a PartitionedGraph<'g>,
    blocks: FxHashMap<usize, usize>,
    weight_deltas: FxHashMap<usize, i64>,
}

impl<'a, 'g> DeltaPartition<'a, 'g> {
    pub fn new(base: &'a PartitionedGraph<'g>) -> Self {
        Self {
            base,
            blocks: FxHashMap::default(),
            weight_deltas: FxHashMap::default(),
        }
    }

    pub fn base(&self) -> &'a PartitionedGraph<'g> {
        self.base
    }

    pub fn block(&self, u: usize) -> usize {
        self.blocks.get(&u).copied().unwrap_or_else(|| self.base.block(u))
    }

    pub fn set_block(&mut self, u: usize, block: usize) {
        let old = self.block(u);
        if old == block {
            return;
        }
        let weight = self.base.graph().node_weight(u);
        *self.weight_deltas.entry(old).or_insert(0) -= weight;
        *self.weight_deltas.entry(block).or_insert(0) += weight;
        self.blocks.insert(u, block);
    }

    pub fn block_weight(&self, b: usize) -> i64 {
        self.base.block_weight(b) + self.weight_deltas.get(&b).copied().unwrap_or(0)
    }

    pub fn changes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.blocks.iter().map(|(&u, &b)| (u, b))
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.weight_deltas.clear();
    }
}
