//! Tuning knobs for the multilevel pipeline. Every struct has defaults that
//! work for medium-size graphs; the driver takes a whole
//! [`PartitionerConfig`].

/// How input nodes are ordered before partitioning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeOrdering {
    /// Keep the caller's node ids.
    Natural,
    /// Reorder nodes into degree buckets (isolated nodes last).
    DegBuckets,
    /// Trust the caller that nodes already arrive in degree-bucket order.
    ImplicitDegBuckets,
}

#[derive(Clone, Debug)]
pub struct CoarseningConfig {
    /// Stop coarsening once the graph has at most this many nodes.
    pub contraction_limit: usize,
    /// Hard upper bound for `max_cluster_weight`.
    pub cluster_weight_limit: i64,
    /// Scales `total_node_weight / contraction_limit` into the cluster
    /// weight cap.
    pub cluster_weight_multiplier: f64,
    /// Maximum number of coarsening levels.
    pub max_levels: usize,
}

impl Default for CoarseningConfig {
    fn default() -> Self {
        Self {
            contraction_limit: 2000,
            cluster_weight_limit: i64::MAX,
            cluster_weight_multiplier: 1.0,
            max_levels: usize::MAX,
        }
    }
}

impl CoarseningConfig {
    /// Weight cap for clusters on a graph with the given total node weight.
    pub fn max_cluster_weight(&self, total_node_weight: i64) -> i64 {
        let by_shrinkage = (self.cluster_weight_multiplier * total_node_weight as f64
            / self.contraction_limit as f64)
            .ceil() as i64;
        by_shrinkage.clamp(1, self.cluster_weight_limit)
    }
}

#[derive(Clone, Debug)]
pub struct LpConfig {
    /// Label propagation rounds; 0 means "until no node moves".
    pub num_iterations: usize,
    /// Nodes with at least this degree only rate a sample of their edges.
    pub large_degree_threshold: usize,
    /// Sample size for high-degree nodes.
    pub max_num_neighbors: usize,
}

impl Default for LpConfig {
    fn default() -> Self {
        Self {
            num_iterations: 5,
            large_degree_threshold: 1_000_000,
            max_num_neighbors: 200_000,
        }
    }
}

/// One pass of the per-level refinement pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefinementAlgorithm {
    /// Label propagation with blocks as clusters.
    LabelPropagation,
    /// JET propose/filter/commit refinement (includes rebalancing).
    Jet,
    /// Move-set rebalancing only.
    Balancer,
}

/// Which balancer the JET refiner runs after each pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalancingAlgorithm {
    /// Grow and move whole sets of nodes (the default).
    MoveSets,
    /// Degenerate variant that moves one node at a time.
    SingleNodes,
}

#[derive(Clone, Debug)]
pub struct JetConfig {
    /// Upper bound on JET passes; 0 means unlimited.
    pub num_iterations: usize,
    /// Stop after this many passes without sufficient improvement; 0 means
    /// unlimited.
    pub num_fruitless_iterations: usize,
    /// A pass is fruitful if it improves the best cut by more than
    /// `(1 - fruitless_threshold) * best_cut`.
    pub fruitless_threshold: f64,
    /// Negative-gain tolerance on coarse levels.
    pub coarse_penalty_factor: f64,
    /// Negative-gain tolerance on fine levels.
    pub fine_penalty_factor: f64,
    pub balancing_algorithm: BalancingAlgorithm,
}

impl Default for JetConfig {
    fn default() -> Self {
        Self {
            num_iterations: 12,
            num_fruitless_iterations: 12,
            fruitless_threshold: 0.999,
            coarse_penalty_factor: 0.25,
            fine_penalty_factor: 0.75,
            balancing_algorithm: BalancingAlgorithm::MoveSets,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BalancerConfig {
    /// Weight cap for a single move set; 0 derives the cap from the largest
    /// block overload.
    pub max_move_set_weight: i64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            max_move_set_weight: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RefinementConfig {
    /// Refiners to run on every level, in order.
    pub algorithms: Vec<RefinementAlgorithm>,
    pub lp: LpConfig,
    pub jet: JetConfig,
    pub balancer: BalancerConfig,
    /// Cell budget above which the dense gain cache falls back to on-the-fly
    /// gain computation.
    pub max_dense_gain_cells: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            algorithms: vec![
                RefinementAlgorithm::LabelPropagation,
                RefinementAlgorithm::Jet,
            ],
            lp: LpConfig::default(),
            jet: JetConfig::default(),
            balancer: BalancerConfig::default(),
            max_dense_gain_cells: 1 << 28,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PartitionerConfig {
    /// Number of blocks, at least 2.
    pub k: usize,
    /// Imbalance tolerance.
    pub epsilon: f64,
    /// Seed for all randomized phases. The result is reproducible for a
    /// fixed seed, thread count and input.
    pub seed: u64,
    /// Worker threads; 0 uses the global rayon pool as-is.
    pub num_threads: usize,
    pub node_ordering: NodeOrdering,
    /// Use the byte-compressed graph representation on every level.
    pub compression: bool,
    pub coarsening: CoarseningConfig,
    pub refinement: RefinementConfig,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            k: 2,
            epsilon: 0.03,
            seed: 0,
            num_threads: 0,
            node_ordering: NodeOrdering::Natural,
            compression: false,
            coarsening: CoarseningConfig::default(),
            refinement: RefinementConfig::default(),
        }
    }
}
