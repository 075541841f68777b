use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::concurrent::RatingMap;
use crate::config::LpConfig;
use crate::graph::Graph;

// Nodes per scheduling chunk; chunks are shuffled and processed in parallel,
// nodes are shuffled within their chunk.
const CHUNK_SIZE: usize = 1024;

/// Parallel randomized label propagation clustering under a hard
/// cluster-weight constraint.
///
/// Every node starts in its own cluster and repeatedly joins the adjacent
/// cluster with the largest incident edge weight, as long as the target stays
/// below `max_cluster_weight`. Ties prefer the less loaded cluster and are
/// otherwise broken by coin flip.
pub struct LpClusterer {
    config: LpConfig,
    seed: u64,
}

impl LpClusterer {
    pub fn new(config: LpConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Returns the cluster id of every node. Terminal clusters respect the
    /// weight cap; ids are not compacted.
    pub fn cluster(&self, graph: &Graph, max_cluster_weight: i64) -> Vec<usize> {
        let n = graph.n();
        let clusters: Vec<AtomicUsize> = (0..n).map(AtomicUsize::new).collect();
        let cluster_weights: Vec<AtomicI64> =
            (0..n).map(|u| AtomicI64::new(graph.node_weight(u))).collect();

        let max_iterations = if self.config.num_iterations == 0 {
            usize::MAX
        } else {
            self.config.num_iterations
        };

        for iteration in 0..max_iterations {
            let moved =
                self.iteration(graph, &clusters, &cluster_weights, max_cluster_weight, iteration);
            log::trace!("lp clustering iteration {iteration}: {moved} nodes moved");
            if moved == 0 {
                break;
            }
        }

        clusters.into_iter().map(AtomicUsize::into_inner).collect()
    }

    fn iteration(
        &self,
        graph: &Graph,
        clusters: &[AtomicUsize],
        cluster_weights: &[AtomicI64],
        max_cluster_weight: i64,
        iteration: usize,
    ) -> usize {
        let n = graph.n();

        // Schedule low-degree buckets before high-degree buckets when the
        // graph is sorted; isolated nodes have nothing to rate and are
        // skipped either way.
        let ranges: Vec<std::ops::Range<usize>> = if graph.is_sorted() {
            (1..=graph.buckets().count())
                .map(|b| graph.buckets().range(b, n))
                .filter(|range| !range.is_empty())
                .collect()
        } else {
            vec![0..n]
        };

        let mut moved = 0;
        let mut chunk_id = 0;
        for range in ranges {
            let mut chunks: Vec<(usize, std::ops::Range<usize>)> = Vec::new();
            let mut begin = range.start;
            while begin < range.end {
                let end = (begin + CHUNK_SIZE).min(range.end);
                chunks.push((chunk_id, begin..end));
                chunk_id += 1;
                begin = end;
            }

            let mut order: Vec<usize> = (0..chunks.len()).collect();
            order.shuffle(&mut self.rng_for(iteration, usize::MAX));

            moved += order
                .par_iter()
                .map_init(
                    || RatingMap::new(n),
                    |map, &i| {
                        let (id, chunk) = &chunks[i];
                        self.process_chunk(
                            graph,
                            clusters,
                            cluster_weights,
                            max_cluster_weight,
                            chunk.clone(),
                            map,
                            &mut self.rng_for(iteration, *id),
                        )
                    },
                )
                .sum::<usize>();
        }

        moved
    }

    fn process_chunk(
        &self,
        graph: &Graph,
        clusters: &[AtomicUsize],
        cluster_weights: &[AtomicI64],
        max_cluster_weight: i64,
        chunk: std::ops::Range<usize>,
        map: &mut RatingMap,
        rng: &mut SmallRng,
    ) -> usize {
        let mut nodes: Vec<usize> = chunk.collect();
        nodes.shuffle(rng);

        let mut moved = 0;
        for u in nodes {
            if self.handle_node(graph, clusters, cluster_weights, max_cluster_weight, u, map, rng)
            {
                moved += 1;
            }
        }
        moved
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_node(
        &self,
        graph: &Graph,
        clusters: &[AtomicUsize],
        cluster_weights: &[AtomicI64],
        max_cluster_weight: i64,
        u: usize,
        map: &mut RatingMap,
        rng: &mut SmallRng,
    ) -> bool {
        let degree = graph.degree(u);
        if degree == 0 {
            return false;
        }

        let sample = if degree >= self.config.large_degree_threshold {
            self.config.max_num_neighbors
        } else {
            usize::MAX
        };

        map.update_upper_bound(degree.min(graph.n()));
        for (e, v) in graph.neighbors(u).take(sample) {
            if v != u {
                map.add(clusters[v].load(Ordering::Relaxed), graph.edge_weight(e));
            }
        }

        let from = clusters[u].load(Ordering::Relaxed);
        let weight_u = graph.node_weight(u);

        let mut best = from;
        let mut best_rating = map.get(from);
        let mut best_overload =
            cluster_weights[from].load(Ordering::Relaxed) - max_cluster_weight;
        map.for_each(|cluster, rating| {
            if cluster == from || rating < best_rating {
                return;
            }
            let cluster_weight = cluster_weights[cluster].load(Ordering::Relaxed);
            if cluster_weight + weight_u > max_cluster_weight {
                return;
            }
            let overload = cluster_weight + weight_u - max_cluster_weight;
            if rating > best_rating
                || overload < best_overload
                || (overload == best_overload && rng.gen_bool(0.5))
            {
                best = cluster;
                best_rating = rating;
                best_overload = overload;
            }
        });
        map.clear();

        if best == from {
            return false;
        }

        if !try_shift_weight(
            &cluster_weights[from],
            &cluster_weights[best],
            weight_u,
            max_cluster_weight,
        ) {
            return false;
        }
        clusters[u].store(best, Ordering::Relaxed);
        true
    }

    fn rng_for(&self, iteration: usize, chunk: usize) -> SmallRng {
        SmallRng::seed_from_u64(
            self.seed ^ ((iteration as u64) << 40) ^ (chunk as u64).wrapping_mul(0x9e37_79b9),
        )
    }
}

/// Moves `weight` from one cluster to another, refusing the move if it would
/// push the target above the cap (checked with a CAS loop, so concurrent
/// joins cannot overshoot).
fn try_shift_weight(from: &AtomicI64, to: &AtomicI64, weight: i64, max: i64) -> bool {
    let mut current = to.load(Ordering::Relaxed);
    loop {
        if current + weight > max {
            return false;
        }
        match to.compare_exchange_weak(
            current,
            current + weight,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
    from.fetch_sub(weight, Ordering::Relaxed);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;

    fn two_triangles() -> Graph {
        // two tight triangles bridged by a light edge
        let mut builder = GraphBuilder::new(6);
        builder.add_edge(0, 1, 10);
        builder.add_edge(1, 2, 10);
        builder.add_edge(0, 2, 10);
        builder.add_edge(3, 4, 10);
        builder.add_edge(4, 5, 10);
        builder.add_edge(3, 5, 10);
        builder.add_edge(2, 3, 1);
        builder.build().unwrap()
    }

    fn cluster_weightmap(graph: &Graph, clusters: &[usize]) -> Vec<i64> {
        let mut weights = vec![0_i64; graph.n()];
        for (u, &c) in clusters.iter().enumerate() {
            weights[c] += graph.node_weight(u);
        }
        weights
    }

    #[test]
    fn test_triangles_collapse_into_clusters() {
        let graph = two_triangles();
        let clusterer = LpClusterer::new(LpConfig::default(), 42);
        let clusters = clusterer.cluster(&graph, 3);

        assert_eq!(clusters[0], clusters[1]);
        assert_eq!(clusters[1], clusters[2]);
        assert_eq!(clusters[3], clusters[4]);
        assert_eq!(clusters[4], clusters[5]);
        assert_ne!(clusters[0], clusters[3]);
    }

    #[test]
    fn test_weight_cap_is_hard() {
        let graph = two_triangles();
        for seed in 0..8 {
            let clusterer = LpClusterer::new(LpConfig::default(), seed);
            let clusters = clusterer.cluster(&graph, 2);
            for &weight in cluster_weightmap(&graph, &clusters).iter() {
                assert!(weight <= 2, "cluster weight {weight} exceeds the cap");
            }
        }
    }

    #[test]
    fn test_heavy_node_keeps_its_own_cluster() {
        let mut builder = GraphBuilder::new(3);
        builder.add_edge(0, 1, 5);
        builder.add_edge(1, 2, 5);
        builder.set_node_weights(vec![10, 1, 1]);
        let graph = builder.build().unwrap();

        let clusterer = LpClusterer::new(LpConfig::default(), 7);
        let clusters = clusterer.cluster(&graph, 4);

        // node 0 is too heavy to be joined but may not lose its own cluster
        let weights = cluster_weightmap(&graph, &clusters);
        assert!(weights.iter().all(|&w| w <= 4 || w == 10));
        assert_eq!(clusters[0], 0);
    }

    #[test]
    fn test_same_seed_same_clustering() {
        let graph = two_triangles();
        let a = LpClusterer::new(LpConfig::default(), 3).cluster(&graph, 3);
        let b = LpClusterer::new(LpConfig::default(), 3).cluster(&graph, 3);
        assert_eq!(a, b);
    }
}
