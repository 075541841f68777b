pub mod builder;
pub mod compressed;

use rayon::prelude::*;

use compressed::CompressedCsr;

/// Highest possible degree bucket plus one: bucket 0 holds isolated nodes,
/// bucket b >= 1 holds degrees in [2^(b-1), 2^b).
pub const NUM_DEGREE_BUCKETS: usize = usize::BITS as usize + 1;

pub fn degree_bucket(degree: usize) -> usize {
    if degree == 0 {
        0
    } else {
        degree.ilog2() as usize + 1
    }
}

/// Prefix view over the nodes of a graph whose node order groups nodes by
/// degree bucket. Non-isolated buckets are laid out in ascending order;
/// isolated nodes (bucket 0) occupy the suffix so that they can be dropped by
/// restricting the node array.
#[derive(Clone, Debug)]
pub struct DegreeBuckets {
    // starts[b] for b in 1..=NUM_DEGREE_BUCKETS is the first position of
    // bucket b; starts[NUM_DEGREE_BUCKETS + 1] is where the isolated suffix
    // begins.
    starts: Vec<usize>,
    num_buckets: usize,
}

impl DegreeBuckets {
    /// Bucket view of an unsorted graph: everything in one bucket.
    pub fn single(n: usize) -> Self {
        let mut starts = vec![n; NUM_DEGREE_BUCKETS + 2];
        starts[0] = 0;
        starts[1] = 0;
        Self {
            starts,
            num_buckets: 1,
        }
    }

    /// Computes bucket prefix sums from the degrees of an already
    /// bucket-sorted node order (thread-local histograms, then a prefix sum).
    pub fn from_sorted_degrees(degrees: &[usize]) -> Self {
        let counts = degrees
            .par_iter()
            .fold(
                || vec![0_usize; NUM_DEGREE_BUCKETS + 1],
                |mut counts, &degree| {
                    counts[degree_bucket(degree)] += 1;
                    counts
                },
            )
            .reduce(
                || vec![0_usize; NUM_DEGREE_BUCKETS + 1],
                |mut a, b| {
                    for (a, b) in a.iter_mut().zip(b) {
                        *a += b;
                    }
                    a
                },
            );

        let num_buckets = counts
            .iter()
            .rposition(|&count| count > 0)
            .map_or(0, |b| b + 1);

        let mut starts = vec![0_usize; NUM_DEGREE_BUCKETS + 2];
        let mut prefix = 0;
        for b in 1..=NUM_DEGREE_BUCKETS {
            starts[b] = prefix;
            prefix += counts[b];
        }
        starts[NUM_DEGREE_BUCKETS + 1] = prefix;

        Self {
            starts,
            num_buckets,
        }
    }

    pub fn count(&self) -> usize {
        self.num_buckets
    }

    /// Positions of bucket `b` in the node order; `n` is the current logical
    /// number of nodes (the isolated suffix may be restricted away).
    pub fn range(&self, b: usize, n: usize) -> std::ops::Range<usize> {
        if b == 0 {
            let start = self.starts[NUM_DEGREE_BUCKETS + 1];
            start.min(n)..n
        } else {
            self.starts[b].min(n)..self.starts[b + 1].min(n)
        }
    }

    /// Number of non-isolated nodes.
    pub fn nonisolated(&self) -> usize {
        self.starts[NUM_DEGREE_BUCKETS + 1]
    }
}

/// Uncompressed CSR graph: `nodes` is the degree prefix sum, `edges` the
/// concatenated adjacency lists. Weights are optional; absent arrays imply
/// unit weights.
pub struct Csr {
    nodes: Vec<usize>,
    edges: Vec<usize>,
    node_weights: Option<Vec<i64>>,
    edge_weights: Option<Vec<i64>>,
    n: usize,
    total_node_weight: i64,
    sorted: bool,
    buckets: DegreeBuckets,
}

impl Csr {
    pub fn new(
        nodes: Vec<usize>,
        edges: Vec<usize>,
        node_weights: Option<Vec<i64>>,
        edge_weights: Option<Vec<i64>>,
        sorted: bool,
    ) -> Self {
        debug_assert!(!nodes.is_empty());
        debug_assert_eq!(*nodes.last().unwrap(), edges.len());

        let n = nodes.len() - 1;
        let buckets = if sorted {
            let degrees: Vec<usize> = nodes.windows(2).map(|w| w[1] - w[0]).collect();
            DegreeBuckets::from_sorted_degrees(&degrees)
        } else {
            DegreeBuckets::single(n)
        };

        let mut graph = Self {
            nodes,
            edges,
            node_weights,
            edge_weights,
            n,
            total_node_weight: 0,
            sorted,
            buckets,
        };
        graph.update_total_node_weight();
        graph
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.edges.len()
    }

    pub fn degree(&self, u: usize) -> usize {
        self.nodes[u + 1] - self.nodes[u]
    }

    pub fn neighbors(&self, u: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.nodes[u]..self.nodes[u + 1]).map(move |e| (e, self.edges[e]))
    }

    pub fn raw_adjacency(&self, u: usize) -> &[usize] {
        &self.edges[self.nodes[u]..self.nodes[u + 1]]
    }

    pub fn first_edge(&self, u: usize) -> usize {
        self.nodes[u]
    }

    pub fn node_weight(&self, u: usize) -> i64 {
        self.node_weights.as_ref().map_or(1, |weights| weights[u])
    }

    pub fn edge_weight(&self, e: usize) -> i64 {
        self.edge_weights.as_ref().map_or(1, |weights| weights[e])
    }

    pub fn node_weights(&self) -> Option<&[i64]> {
        self.node_weights.as_deref()
    }

    pub fn edge_weights(&self) -> Option<&[i64]> {
        self.edge_weights.as_deref()
    }

    fn update_total_node_weight(&mut self) {
        self.total_node_weight = match &self.node_weights {
            Some(weights) => weights[..self.n].par_iter().sum(),
            None => self.n as i64,
        };
    }
}

/// Graph representation selected by `compression.enabled`: a closed variant
/// set so that the hot loops monomorphize per level.
pub enum Graph {
    Csr(Csr),
    Compressed(CompressedCsr),
}

pub enum Neighbors<'a> {
    Csr(std::ops::Range<usize>, &'a [usize]),
    Compressed(compressed::CompressedNeighbors<'a>),
}

impl Iterator for Neighbors<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        match self {
            Neighbors::Csr(range, edges) => {
                let e = range.next()?;
                Some((e, edges[e]))
            }
            Neighbors::Compressed(decoder) => decoder.next(),
        }
    }
}

impl Graph {
    pub fn n(&self) -> usize {
        match self {
            Graph::Csr(graph) => graph.n(),
            Graph::Compressed(graph) => graph.n(),
        }
    }

    pub fn m(&self) -> usize {
        match self {
            Graph::Csr(graph) => graph.m(),
            Graph::Compressed(graph) => graph.m(),
        }
    }

    pub fn degree(&self, u: usize) -> usize {
        match self {
            Graph::Csr(graph) => graph.degree(u),
            Graph::Compressed(graph) => graph.degree(u),
        }
    }

    pub fn neighbors(&self, u: usize) -> Neighbors<'_> {
        match self {
            Graph::Csr(graph) => Neighbors::Csr(graph.nodes[u]..graph.nodes[u + 1], &graph.edges),
            Graph::Compressed(graph) => Neighbors::Compressed(graph.neighbors(u)),
        }
    }

    pub fn node_weight(&self, u: usize) -> i64 {
        match self {
            Graph::Csr(graph) => graph.node_weight(u),
            Graph::Compressed(graph) => graph.node_weight(u),
        }
    }

    pub fn edge_weight(&self, e: usize) -> i64 {
        match self {
            Graph::Csr(graph) => graph.edge_weight(e),
            Graph::Compressed(graph) => graph.edge_weight(e),
        }
    }

    pub fn total_node_weight(&self) -> i64 {
        match self {
            Graph::Csr(graph) => graph.total_node_weight,
            Graph::Compressed(graph) => graph.total_node_weight(),
        }
    }

    pub fn is_sorted(&self) -> bool {
        match self {
            Graph::Csr(graph) => graph.sorted,
            Graph::Compressed(graph) => graph.is_sorted(),
        }
    }

    pub fn buckets(&self) -> &DegreeBuckets {
        match self {
            Graph::Csr(graph) => &graph.buckets,
            Graph::Compressed(graph) => graph.buckets(),
        }
    }

    /// Restricts the logical node count by dropping `count` isolated nodes
    /// from the suffix of the bucket-sorted node order. No data is copied.
    pub fn remove_isolated_nodes(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        assert!(self.is_sorted(), "graph must be sorted by degree buckets");
        assert!(self.n() - count >= self.buckets().nonisolated());

        match self {
            Graph::Csr(graph) => {
                graph.n -= count;
                graph.update_total_node_weight();
            }
            Graph::Compressed(graph) => graph.restrict(count),
        }
    }

    /// Reverts [`remove_isolated_nodes`](Graph::remove_isolated_nodes).
    pub fn integrate_isolated_nodes(&mut self) {
        assert!(self.is_sorted(), "graph must be sorted by degree buckets");
        match self {
            Graph::Csr(graph) => {
                graph.n = graph.nodes.len() - 1;
                graph.update_total_node_weight();
            }
            Graph::Compressed(graph) => graph.unrestrict(),
        }
    }

    /// Number of isolated nodes currently part of the graph.
    pub fn isolated_nodes(&self) -> usize {
        if self.is_sorted() {
            self.n().saturating_sub(self.buckets().nonisolated())
        } else {
            0
        }
    }
}
