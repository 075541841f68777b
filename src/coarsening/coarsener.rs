use rayon::prelude::*;

use crate::algorithms::LpClusterer;
use crate::coarsening::contract_clustering;
use crate::config::PartitionerConfig;
use crate::graph::compressed::CompressedCsr;
use crate::graph::Graph;

// Contraction below this shrinkage is not worth another level.
const CONVERGENCE_THRESHOLD: f64 = 0.95;

struct Level {
    graph: Graph,
    // fine node (one level below) -> coarse node in `graph`
    mapping: Vec<usize>,
}

/// Owns the hierarchy of coarse graphs. Levels are pushed by
/// [`coarsen_once`](Coarsener::coarsen_once) and popped (last in, first out)
/// by [`uncoarsen_once`](Coarsener::uncoarsen_once); the input graph always
/// outlives the hierarchy.
pub struct Coarsener<'g> {
    input: &'g Graph,
    config: PartitionerConfig,
    levels: Vec<Level>,
    converged: bool,
}

impl<'g> Coarsener<'g> {
    pub fn new(input: &'g Graph, config: &PartitionerConfig) -> Self {
        Self {
            input,
            config: config.clone(),
            levels: Vec::new(),
            converged: false,
        }
    }

    pub fn level(&self) -> usize {
        self.levels.len()
    }

    /// The coarsest graph of the hierarchy. Calling
    /// [`uncoarsen_once`](Coarsener::uncoarsen_once) invalidates previously
    /// returned references, so callers must re-fetch after every pop.
    pub fn coarsest(&self) -> &Graph {
        self.levels.last().map_or(self.input, |level| &level.graph)
    }

    /// Runs one round of clustering and contraction. Returns `false` once
    /// coarsening has converged: the level cap is reached, the clustering is
    /// trivial, or the graph shrank by less than 5%.
    pub fn coarsen_once(&mut self, max_cluster_weight: i64) -> bool {
        if self.converged || self.level() >= self.config.coarsening.max_levels {
            return false;
        }

        let (coarse, mapping, old_n) = {
            let graph = self.coarsest();
            let clusterer = self.clusterer();
            let clustering = clusterer.cluster(graph, max_cluster_weight);

            let trivial = clustering.par_iter().enumerate().all(|(u, &c)| u == c);
            if trivial {
                log::debug!("coarsening converged: trivial clustering on level {}", self.level());
                self.converged = true;
                return false;
            }

            let (coarse, mapping) = contract_clustering(graph, &clustering);
            (coarse, mapping, graph.n())
        };

        if coarse.n() as f64 / old_n as f64 >= CONVERGENCE_THRESHOLD {
            log::debug!(
                "coarsening converged: insufficient shrinkage from {} to {} nodes",
                old_n,
                coarse.n()
            );
            self.converged = true;
            return false;
        }

        log::debug!("coarsened level {}: {} -> {} nodes", self.level(), old_n, coarse.n());
        let graph = if self.config.compression {
            let compressed = CompressedCsr::from_csr(&coarse);
            log::debug!(
                "compressed level adjacency into {} bytes ({} interval nodes)",
                compressed.memory(),
                compressed.num_interval_nodes()
            );
            Graph::Compressed(compressed)
        } else {
            Graph::Csr(coarse)
        };
        self.levels.push(Level { graph, mapping });
        true
    }

    /// Coarsens until convergence or until the contraction limit is reached.
    pub fn coarsen(&mut self) {
        loop {
            let graph = self.coarsest();
            if graph.n() <= self.config.coarsening.contraction_limit {
                break;
            }
            let max_cluster_weight = self
                .config
                .coarsening
                .max_cluster_weight(graph.total_node_weight());
            if !self.coarsen_once(max_cluster_weight) {
                break;
            }
        }
    }

    /// Pops the top level and projects a partition of it onto the graph one
    /// level below.
    pub fn uncoarsen_once(&mut self, partition: &[usize]) -> Vec<usize> {
        let level = self.levels.pop().expect("no coarse level to pop");
        debug_assert_eq!(partition.len(), level.graph.n());
        debug_assert_eq!(level.mapping.len(), self.coarsest().n());

        level
            .mapping
            .par_iter()
            .map(|&coarse| partition[coarse])
            .collect()
    }
}

impl Coarsener<'_> {
    fn clusterer(&self) -> LpClusterer {
        // one seed stream per level
        LpClusterer::new(
            self.config.refinement.lp.clone(),
            self.config.seed.wrapping_add(self.level() as u64),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;

    fn ladder(n: usize) -> Graph {
        // two parallel paths with rungs, enough structure to contract
        let mut builder = GraphBuilder::new(2 * n);
        for i in 0..n - 1 {
            builder.add_edge(2 * i, 2 * (i + 1), 2);
            builder.add_edge(2 * i + 1, 2 * (i + 1) + 1, 2);
        }
        for i in 0..n {
            builder.add_edge(2 * i, 2 * i + 1, 3);
        }
        builder.build().unwrap()
    }

    fn config(limit: usize) -> PartitionerConfig {
        PartitionerConfig {
            coarsening: crate::config::CoarseningConfig {
                contraction_limit: limit,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_hierarchy_preserves_node_weight() {
        let graph = ladder(32);
        let total = graph.total_node_weight();

        let mut coarsener = Coarsener::new(&graph, &config(8));
        coarsener.coarsen();

        assert!(coarsener.level() > 0);
        assert!(coarsener.coarsest().n() < graph.n());
        assert_eq!(coarsener.coarsest().total_node_weight(), total);
    }

    #[test]
    fn test_projection_restores_fine_partition() {
        let graph = ladder(16);
        let mut coarsener = Coarsener::new(&graph, &config(4));
        coarsener.coarsen();
        let levels = coarsener.level();
        assert!(levels > 0);

        // color the coarsest graph, then project all the way down
        let mut partition: Vec<usize> =
            (0..coarsener.coarsest().n()).map(|c| c % 2).collect();
        let coarse_weights = {
            let coarsest = coarsener.coarsest();
            let mut weights = [0_i64; 2];
            for (c, &b) in partition.iter().enumerate() {
                weights[b] += coarsest.node_weight(c);
            }
            weights
        };

        for _ in 0..levels {
            partition = coarsener.uncoarsen_once(&partition);
        }

        assert_eq!(partition.len(), graph.n());
        let mut fine_weights = [0_i64; 2];
        for (u, &b) in partition.iter().enumerate() {
            fine_weights[b] += graph.node_weight(u);
        }
        // block weights carry over exactly through projection
        assert_eq!(fine_weights, coarse_weights);
    }

    #[test]
    fn test_max_levels_cap() {
        let graph = ladder(64);
        let mut config = config(2);
        config.coarsening.max_levels = 1;

        let mut coarsener = Coarsener::new(&graph, &config);
        coarsener.coarsen();
        assert_eq!(coarsener.level(), 1);
    }
}
