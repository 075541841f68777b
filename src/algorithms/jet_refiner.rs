// Parallel refiner in the style of "Jet: Multilevel Graph Partitioning on
// GPUs" by Gilbert et al.: propose moves for all nodes at once, filter them
// with projected gains, commit the survivors, rebalance, and keep the best
// partition seen.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use rayon::prelude::*;

use crate::algorithms::{GreedyBalancer, Refine};
use crate::concurrent::RatingMap;
use crate::config::RefinementConfig;
use crate::distributed::GhostExchange;
use crate::gain::GainCache;
use crate::partition::{PartitionContext, PartitionedGraph};

pub struct JetRefiner {
    config: crate::config::JetConfig,
    contraction_limit: usize,
    penalty_factor: f64,
    gain: GainCache,
    balancer: GreedyBalancer,
    gains_and_targets: Vec<(i64, usize)>,
    locked: Vec<AtomicU8>,
    block_weight_deltas: Vec<AtomicI64>,
    snapshooter: Snapshooter,
    ghost: Option<Box<dyn GhostExchange + Send + Sync>>,
}

impl JetRefiner {
    pub fn new(config: &RefinementConfig, contraction_limit: usize, n: usize, k: usize) -> Self {
        Self {
            config: config.jet.clone(),
            contraction_limit,
            penalty_factor: config.jet.fine_penalty_factor,
            gain: GainCache::for_graph(n, k, config.max_dense_gain_cells),
            balancer: GreedyBalancer::new(
                config.balancer.clone(),
                config.jet.balancing_algorithm,
            ),
            gains_and_targets: Vec::new(),
            locked: Vec::new(),
            block_weight_deltas: Vec::new(),
            snapshooter: Snapshooter::default(),
            ghost: None,
        }
    }

    /// Installs the cross-process exchange used at the two synchronization
    /// points of every pass; without one the refiner runs purely in shared
    /// memory.
    pub fn with_ghost_exchange(mut self, ghost: Box<dyn GhostExchange + Send + Sync>) -> Self {
        self.ghost = Some(ghost);
        self
    }

    fn find_moves(&mut self, p_graph: &PartitionedGraph) {
        let penalty_factor = self.penalty_factor;
        let gain = &self.gain;
        let locked = &self.locked;

        self.gains_and_targets
            .par_iter_mut()
            .enumerate()
            .for_each_init(
                || RatingMap::new(p_graph.k()),
                |map, (u, slot)| {
                    let from = p_graph.block(u);
                    if locked[u].load(Ordering::Relaxed) != 0 {
                        *slot = (0, from);
                        return;
                    }

                    let gainer = gain.max_gainer(p_graph, u, map);
                    let penalty = (penalty_factor * gainer.int_degree as f64).floor() as i64;
                    if gainer.block != from
                        && (gainer.ext_degree > gainer.int_degree
                            || gainer.absolute_gain() >= -penalty)
                    {
                        *slot = (gainer.absolute_gain(), gainer.block);
                    } else {
                        *slot = (0, from);
                    }
                },
            );
    }

    fn filter_moves(&self, p_graph: &PartitionedGraph) {
        let graph = p_graph.graph();
        let gains_and_targets = &self.gains_and_targets;

        self.locked.par_iter().enumerate().for_each(|(u, lock)| {
            lock.store(0, Ordering::Relaxed);

            let from_u = p_graph.block(u);
            let (gain_u, to_u) = gains_and_targets[u];
            if from_u == to_u {
                return;
            }

            // A neighbor counts as moved exactly when it beats u by gain or,
            // at equal gain, by lower id. The asymmetric id break keeps the
            // reasoning of u about v and of v about u consistent without a
            // lock.
            let mut projected_gain = 0;
            for (e, v) in graph.neighbors(u) {
                if v == u {
                    continue;
                }
                let weight = graph.edge_weight(e);
                let (gain_v, to_v) = gains_and_targets[v];
                let projected_block = if gain_v > gain_u || (gain_v == gain_u && v < u) {
                    to_v
                } else {
                    p_graph.block(v)
                };

                if projected_block == to_u {
                    projected_gain += weight;
                } else if projected_block == from_u {
                    projected_gain -= weight;
                }
            }

            // Locking the node means the move is executed next phase.
            if projected_gain >= 0 {
                lock.store(1, Ordering::Relaxed);
            }
        });
    }

    fn execute_moves(&self, p_graph: &PartitionedGraph) {
        let graph = p_graph.graph();
        (0..p_graph.n()).into_par_iter().for_each(|u| {
            if self.locked[u].load(Ordering::Relaxed) != 0 {
                let from = p_graph.block(u);
                let to = self.gains_and_targets[u].1;
                p_graph.set_block_unchecked(u, to);

                let weight = graph.node_weight(u);
                self.block_weight_deltas[from].fetch_sub(weight, Ordering::Relaxed);
                self.block_weight_deltas[to].fetch_add(weight, Ordering::Relaxed);

                self.gain.move_node(p_graph, u, from, to);
            }
        });
    }

    fn apply_block_weight_deltas(&mut self, p_graph: &PartitionedGraph) {
        let mut deltas: Vec<i64> = self
            .block_weight_deltas
            .iter()
            .map(|delta| delta.swap(0, Ordering::Relaxed))
            .collect();

        if let Some(ghost) = &mut self.ghost {
            ghost.allreduce_block_weight_deltas(&mut deltas);
        }

        for (b, delta) in deltas.into_iter().enumerate() {
            p_graph.add_block_weight(b, delta);
        }
    }
}

impl Refine for JetRefiner {
    fn initialize(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) {
        let n = p_graph.n();
        let k = p_graph.k();

        self.penalty_factor = if n <= 2 * k * self.contraction_limit {
            self.config.coarse_penalty_factor
        } else {
            self.config.fine_penalty_factor
        };

        self.gain.initialize(p_graph);

        self.gains_and_targets = (0..n).map(|u| (0, p_graph.block(u))).collect();
        self.locked = (0..n).map(|_| AtomicU8::new(0)).collect();
        self.block_weight_deltas = (0..k).map(|_| AtomicI64::new(0)).collect();

        self.snapshooter.init(p_graph, p_ctx);
    }

    fn refine(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) -> bool {
        debug_assert!(self.locked.iter().all(|lock| lock.load(Ordering::Relaxed) == 0));
        debug_assert!(self
            .block_weight_deltas
            .iter()
            .all(|delta| delta.load(Ordering::Relaxed) == 0));

        let max_iterations = if self.config.num_iterations == 0 {
            usize::MAX
        } else {
            self.config.num_iterations
        };
        let max_fruitless = if self.config.num_fruitless_iterations == 0 {
            usize::MAX
        } else {
            self.config.num_fruitless_iterations
        };

        let initial_cut = p_graph.edge_cut();
        let mut best_cut = initial_cut;
        let mut cur_iteration = 0;
        let mut fruitless_iteration = 0;

        loop {
            self.find_moves(p_graph);
            if let Some(ghost) = &mut self.ghost {
                ghost.synchronize_move_candidates(p_graph, &mut self.gains_and_targets);
            }
            self.filter_moves(p_graph);
            self.execute_moves(p_graph);
            if self.ghost.is_some() {
                let locked = &self.locked;
                let moved = move |u: usize| locked[u].load(Ordering::Relaxed) != 0;
                self.ghost
                    .as_mut()
                    .unwrap()
                    .synchronize_labels(p_graph, &moved);
            }
            self.apply_block_weight_deltas(p_graph);

            debug_assert!(p_graph.validate(), "partition inconsistent after JET pass");
            debug_assert!(self.gain.validate(p_graph), "gain cache inconsistent after JET pass");

            self.balancer.balance(p_graph, p_ctx, Some(&self.gain));
            self.snapshooter.update(p_graph, p_ctx);

            cur_iteration += 1;
            fruitless_iteration += 1;

            let final_cut = p_graph.edge_cut();
            if (best_cut - final_cut) as f64
                > (1.0 - self.config.fruitless_threshold) * best_cut as f64
            {
                log::debug!("jet pass {cur_iteration}: cut improved from {best_cut} to {final_cut}");
                best_cut = final_cut;
                fruitless_iteration = 0;
            } else {
                log::debug!(
                    "jet pass {cur_iteration}: fruitless cut change from {best_cut} to {final_cut}"
                );
            }

            if cur_iteration >= max_iterations || fruitless_iteration >= max_fruitless {
                break;
            }
        }

        self.snapshooter.rollback(p_graph);
        debug_assert!(p_graph.validate());
        self.snapshooter.best_cut < initial_cut
    }
}

/// Keeps the best partition seen across passes. Only feasible partitions are
/// snapshotted; as long as none was seen, the least infeasible one is kept
/// instead, so rollback never worsens the balance of an infeasible run.
#[derive(Default)]
struct Snapshooter {
    best_partition: Vec<usize>,
    best_cut: i64,
    best_feasible: bool,
    best_overload: i64,
}

impl Snapshooter {
    fn init(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) {
        self.best_partition = p_graph.snapshot();
        self.best_cut = p_graph.edge_cut();
        self.best_feasible = p_graph.is_feasible(p_ctx);
        self.best_overload = p_graph.total_overload(p_ctx);
    }

    fn update(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) {
        let cut = p_graph.edge_cut();
        let feasible = p_graph.is_feasible(p_ctx);
        let overload = p_graph.total_overload(p_ctx);

        let better = if feasible {
            !self.best_feasible || cut < self.best_cut
        } else {
            !self.best_feasible
                && (overload < self.best_overload
                    || (overload == self.best_overload && cut < self.best_cut))
        };

        if better {
            self.best_partition = p_graph.snapshot();
            self.best_cut = cut;
            self.best_feasible = feasible;
            self.best_overload = overload;
        }
    }

    fn rollback(&self, p_graph: &PartitionedGraph) {
        p_graph.restore(&self.best_partition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;

    fn refiner_for(p_graph: &PartitionedGraph, iterations: usize) -> JetRefiner {
        let config = RefinementConfig {
            jet: crate::config::JetConfig {
                num_iterations: iterations,
                ..Default::default()
            },
            ..Default::default()
        };
        JetRefiner::new(&config, 2000, p_graph.n(), p_graph.k())
    }

    #[test]
    fn test_triangle_has_no_improvement() {
        let mut builder = GraphBuilder::new(3);
        builder.add_edge(0, 1, 1);
        builder.add_edge(1, 2, 1);
        builder.add_edge(0, 2, 1);
        let graph = builder.build().unwrap();

        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 1, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());

        let mut refiner = refiner_for(&p_graph, 12);
        refiner.initialize(&p_graph, &p_ctx);
        let improved = refiner.refine(&p_graph, &p_ctx);

        assert!(!improved);
        assert_eq!(p_graph.edge_cut(), 2);
    }

    #[test]
    fn test_alternating_path_reaches_optimum() {
        let mut builder = GraphBuilder::new(6);
        for u in 0..5 {
            builder.add_edge(u, u + 1, 1);
        }
        let graph = builder.build().unwrap();

        // cut 5; the optimum {0,1,2}|{3,4,5} has cut 1
        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 1, 0, 1, 0, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());

        let mut refiner = refiner_for(&p_graph, 3);
        refiner.initialize(&p_graph, &p_ctx);
        let improved = refiner.refine(&p_graph, &p_ctx);

        assert!(improved);
        assert_eq!(p_graph.edge_cut(), 1);
        assert!(p_graph.is_feasible(&p_ctx));
    }

    #[test]
    fn test_clique_ring_converges_to_bridges() {
        // four cliques of four nodes (internal weight 10), bridged in a ring
        // by unit edges; the minimum 4-way cut severs exactly the bridges
        let mut builder = GraphBuilder::new(16);
        for clique in 0..4 {
            let base = 4 * clique;
            for i in base..base + 4 {
                for j in i + 1..base + 4 {
                    builder.add_edge(i, j, 10);
                }
            }
        }
        builder.add_edge(3, 4, 1);
        builder.add_edge(7, 8, 1);
        builder.add_edge(11, 12, 1);
        builder.add_edge(15, 0, 1);
        let graph = builder.build().unwrap();

        let partition = vec![3, 3, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3];
        let p_graph = PartitionedGraph::new(&graph, 4, partition);
        let p_ctx = PartitionContext::new(4, 0.0, graph.total_node_weight());

        let mut refiner = refiner_for(&p_graph, 12);
        refiner.initialize(&p_graph, &p_ctx);
        refiner.refine(&p_graph, &p_ctx);

        assert_eq!(p_graph.edge_cut(), 4);
        assert!(p_graph.is_feasible(&p_ctx));
    }

    #[test]
    fn test_rollback_never_worsens_the_cut() {
        let mut builder = GraphBuilder::new(8);
        for u in 0..7 {
            builder.add_edge(u, u + 1, 1);
        }
        builder.add_edge(0, 4, 2);
        builder.add_edge(2, 6, 3);
        let graph = builder.build().unwrap();

        for seed_partition in [
            vec![0, 1, 0, 1, 0, 1, 0, 1],
            vec![1, 0, 0, 1, 1, 0, 0, 1],
            vec![0, 0, 1, 1, 0, 0, 1, 1],
        ] {
            let p_graph = PartitionedGraph::new(&graph, 2, seed_partition);
            let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());
            let before = p_graph.edge_cut();

            let mut refiner = refiner_for(&p_graph, 6);
            refiner.initialize(&p_graph, &p_ctx);
            refiner.refine(&p_graph, &p_ctx);

            assert!(p_graph.edge_cut() <= before);
            assert!(p_graph.validate());
        }
    }

    #[test]
    fn test_filter_tie_break_is_asymmetric() {
        // two adjacent nodes proposing moves with equal gains: exactly one of
        // them must consider the other as moved, never both, never neither
        let mut builder = GraphBuilder::new(4);
        builder.add_edge(0, 1, 1);
        builder.add_edge(1, 2, 2);
        builder.add_edge(2, 3, 1);
        let graph = builder.build().unwrap();

        let p_graph = PartitionedGraph::new(&graph, 2, vec![0, 1, 0, 1]);
        let p_ctx = PartitionContext::new(2, 0.0, graph.total_node_weight());

        let mut refiner = refiner_for(&p_graph, 1);
        refiner.initialize(&p_graph, &p_ctx);
        refiner.find_moves(&p_graph);

        let (gain_1, to_1) = refiner.gains_and_targets[1];
        let (gain_2, to_2) = refiner.gains_and_targets[2];
        assert_eq!((gain_1, to_1), (3, 0));
        assert_eq!((gain_2, to_2), (3, 1));

        let one_sees_two = gain_2 > gain_1 || (gain_2 == gain_1 && 2 < 1);
        let two_sees_one = gain_1 > gain_2 || (gain_1 == gain_2 && 1 < 2);
        assert!(one_sees_two != two_sees_one);
    }
}
