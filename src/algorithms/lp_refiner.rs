use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::algorithms::Refine;
use crate::concurrent::RatingMap;
use crate::config::LpConfig;
use crate::partition::{PartitionContext, PartitionedGraph};

const CHUNK_SIZE: usize = 1024;

/// Label propagation with blocks as clusters: every node greedily moves to
/// the adjacent block of maximum gain, subject to the block-weight caps.
///
/// The cap is hard except for repair moves: a node already sitting in an
/// overloaded block may enter a full target as long as that target is less
/// overloaded than the source.
pub struct LpRefiner {
    config: LpConfig,
    seed: u64,
}

impl LpRefiner {
    pub fn new(config: LpConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    fn iteration(
        &self,
        p_graph: &PartitionedGraph,
        p_ctx: &PartitionContext,
        iteration: usize,
    ) -> usize {
        let n = p_graph.n();
        let chunks: Vec<std::ops::Range<usize>> = (0..n)
            .step_by(CHUNK_SIZE)
            .map(|begin| begin..(begin + CHUNK_SIZE).min(n))
            .collect();

        let mut order: Vec<usize> = (0..chunks.len()).collect();
        order.shuffle(&mut self.rng_for(iteration, usize::MAX));

        order
            .par_iter()
            .map_init(
                || RatingMap::new(p_graph.k()),
                |map, &i| {
                    let mut rng = self.rng_for(iteration, i);
                    let mut nodes: Vec<usize> = chunks[i].clone().collect();
                    nodes.shuffle(&mut rng);

                    nodes
                        .into_iter()
                        .filter(|&u| self.handle_node(p_graph, p_ctx, u, map, &mut rng))
                        .count()
                },
            )
            .sum()
    }

    fn handle_node(
        &self,
        p_graph: &PartitionedGraph,
        p_ctx: &PartitionContext,
        u: usize,
        map: &mut RatingMap,
        rng: &mut SmallRng,
    ) -> bool {
        let graph = p_graph.graph();
        let degree = graph.degree(u);
        if degree == 0 {
            return false;
        }

        let sample = if degree >= self.config.large_degree_threshold {
            self.config.max_num_neighbors
        } else {
            usize::MAX
        };

        map.update_upper_bound(degree.min(p_graph.k()));
        for (e, v) in graph.neighbors(u).take(sample) {
            if v != u {
                map.add(p_graph.block(v), graph.edge_weight(e));
            }
        }

        let from = p_graph.block(u);
        let weight_u = graph.node_weight(u);
        let initial_overload = p_graph.block_weight(from) - p_ctx.max_block_weight(from);

        let mut best = from;
        let mut best_rating = map.get(from);
        let mut best_overload = initial_overload;
        map.for_each(|block, rating| {
            if block == from || rating < best_rating {
                return;
            }
            let block_weight = p_graph.block_weight(block);
            let max_block = p_ctx.max_block_weight(block);
            let overload = block_weight - max_block;

            let improves = rating > best_rating
                || overload < best_overload
                || (overload == best_overload && rng.gen_bool(0.5));
            let fits = block_weight + weight_u <= max_block || overload < initial_overload;
            if improves && fits {
                best = block;
                best_rating = rating;
                best_overload = overload;
            }
        });
        map.clear();

        if best == from {
            return false;
        }

        let max_to = p_ctx.max_block_weight(best);
        let repair = initial_overload > 0
            && p_graph.block_weight(best) - max_to < initial_overload;
        let moved = if repair {
            p_graph.move_block_weight(from, best, weight_u);
            true
        } else {
            p_graph.try_move_block_weight(from, best, weight_u, max_to)
        };

        if moved {
            p_graph.set_block_unchecked(u, best);
        }
        moved
    }

    fn rng_for(&self, iteration: usize, chunk: usize) -> SmallRng {
        SmallRng::seed_from_u64(
            self.seed ^ ((iteration as u64) << 40) ^ (chunk as u64).wrapping_mul(0x9e37_79b9),
        )
    }
}

impl Refine for LpRefiner {
    fn initialize(&mut self, _p_graph: &PartitionedGraph, _p_ctx: &PartitionContext) {}

    fn refine(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) -> bool {
        let initial_cut = p_graph.edge_cut();

        let max_iterations = if self.config.num_iterations == 0 {
            usize::MAX
        } else {
            self.config.num_iterations
        };
        for iteration in 0..max_iterations {
            let moved = self.iteration(p_graph, p_ctx, iteration);
            log::trace!("lp refinement iteration {iteration}: {moved} nodes moved");
            if moved == 0 {
                break;
            }
        }

        debug_assert!(p_graph.validate());
        p_graph.edge_cut() < initial_cut
    }
}
