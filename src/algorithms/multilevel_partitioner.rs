use crate::algorithms::{Error, Greedy, GreedyBalancer, JetRefiner, LpRefiner, Refine};
use crate::coarsening::Coarsener;
use crate::config::{PartitionerConfig, RefinementAlgorithm};
use crate::graph::Graph;
use crate::partition::{PartitionContext, PartitionedGraph};
use crate::Partition;

/// Multilevel k-way partitioner: label-propagation coarsening down to the
/// contraction limit, greedy initial partitioning of the coarsest graph, and
/// per-level label-propagation plus JET refinement on the way back up.
///
/// # Example
///
/// ```rust
/// use kwaycut::algorithms::MultiLevelPartitioner;
/// use kwaycut::config::PartitionerConfig;
/// use kwaycut::graph::builder::GraphBuilder;
/// use kwaycut::Partition;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut builder = GraphBuilder::new(6);
/// for u in 0..5 {
///     builder.add_edge(u, u + 1, 1);
/// }
/// let mut graph = builder.build()?;
/// let mut partition = vec![0; graph.n()];
///
/// let config = PartitionerConfig { k: 2, ..Default::default() };
/// let report = MultiLevelPartitioner { config }.partition(&mut partition, &mut graph)?;
/// assert!(report.feasible);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MultiLevelPartitioner {
    pub config: PartitionerConfig,
}

/// Diagnostics of a partitioning run. An infeasible epsilon does not abort
/// the run; the partitioner returns its best effort and reports the achieved
/// imbalance here.
#[derive(Clone, Copy, Debug)]
pub struct PartitionReport {
    pub edge_cut: i64,
    pub imbalance: f64,
    pub feasible: bool,
    /// Number of coarsening levels that were built.
    pub levels: usize,
}

fn multilevel_partition(
    partition: &mut [usize],
    graph: &mut Graph,
    config: &PartitionerConfig,
) -> Result<PartitionReport, Error> {
    let k = config.k;

    // Isolated nodes contribute nothing to the cut; drop them during the
    // multilevel phase and distribute them over the lightest blocks at the
    // end.
    let isolated = graph.isolated_nodes();
    if isolated > 0 {
        graph.remove_isolated_nodes(isolated);
        log::debug!("removed {isolated} isolated nodes before partitioning");
    }

    let mut levels = 0;
    let mut current = {
        let mut coarsener = Coarsener::new(graph, config);
        coarsener.coarsen();
        levels = coarsener.level();
        log::debug!(
            "coarsened {} nodes to {} nodes on {} levels",
            graph.n(),
            coarsener.coarsest().n(),
            levels
        );

        // Initial partition of the coarsest graph by node weight alone; the
        // refiners take care of the cut.
        let mut current: Vec<usize> = vec![0; coarsener.coarsest().n()];
        {
            let coarsest = coarsener.coarsest();
            let weights: Vec<i64> = (0..coarsest.n()).map(|c| coarsest.node_weight(c)).collect();
            Greedy { part_count: k }.partition(&mut current, &weights)?;
        }

        loop {
            {
                let level_graph = coarsener.coarsest();
                let p_graph = PartitionedGraph::new(level_graph, k, current.clone());
                let p_ctx =
                    PartitionContext::new(k, config.epsilon, level_graph.total_node_weight());

                for algorithm in &config.refinement.algorithms {
                    let mut refiner: Box<dyn Refine> = match algorithm {
                        RefinementAlgorithm::LabelPropagation => Box::new(LpRefiner::new(
                            config.refinement.lp.clone(),
                            config.seed,
                        )),
                        RefinementAlgorithm::Jet => Box::new(JetRefiner::new(
                            &config.refinement,
                            config.coarsening.contraction_limit,
                            level_graph.n(),
                            k,
                        )),
                        RefinementAlgorithm::Balancer => Box::new(GreedyBalancer::new(
                            config.refinement.balancer.clone(),
                            config.refinement.jet.balancing_algorithm,
                        )),
                    };
                    refiner.initialize(&p_graph, &p_ctx);
                    refiner.refine(&p_graph, &p_ctx);
                }

                log::debug!(
                    "refined level with {} nodes: cut {}, imbalance {:.4}",
                    level_graph.n(),
                    p_graph.edge_cut(),
                    p_graph.imbalance()
                );
                current = p_graph.snapshot();
            }

            if coarsener.level() == 0 {
                break;
            }
            current = coarsener.uncoarsen_once(&current);
        }

        current
    };

    if isolated > 0 {
        graph.integrate_isolated_nodes();

        // Fill the lightest blocks first.
        let mut block_weights = vec![0_i64; k];
        for (u, &b) in current.iter().enumerate() {
            block_weights[b] += graph.node_weight(u);
        }
        for u in current.len()..graph.n() {
            let lightest = (0..k).min_by_key(|&b| block_weights[b]).unwrap();
            block_weights[lightest] += graph.node_weight(u);
            current.push(lightest);
        }
    }

    partition.copy_from_slice(&current);

    let p_graph = PartitionedGraph::new(graph, k, current);
    let p_ctx = PartitionContext::new(k, config.epsilon, graph.total_node_weight());
    let report = PartitionReport {
        edge_cut: p_graph.edge_cut(),
        imbalance: p_graph.imbalance(),
        feasible: p_graph.is_feasible(&p_ctx),
        levels,
    };
    if !report.feasible {
        log::warn!(
            "no feasible partition for epsilon {}: final imbalance {:.4}",
            config.epsilon,
            report.imbalance
        );
    }
    Ok(report)
}

impl<'a> Partition<&'a mut Graph> for MultiLevelPartitioner {
    type Metadata = PartitionReport;
    type Error = Error;

    fn partition(
        &mut self,
        part_ids: &mut [usize],
        graph: &'a mut Graph,
    ) -> Result<Self::Metadata, Self::Error> {
        if part_ids.len() != graph.n() {
            return Err(Error::InputLenMismatch {
                expected: part_ids.len(),
                actual: graph.n(),
            });
        }

        if self.config.num_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.num_threads)
                .build()
                .expect("failed to build worker pool");
            pool.install(|| multilevel_partition(part_ids, graph, &self.config))
        } else {
            multilevel_partition(part_ids, graph, &self.config)
        }
    }
}
