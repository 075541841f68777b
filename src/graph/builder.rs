use crate::algorithms::Error;
use crate::graph::{degree_bucket, Csr, Graph};

/// Assembles a [`Graph`] from an edge list, validating the input on the way:
/// adjacency must be symmetric, edge weights positive and node weights
/// non-negative. Parallel edges between the same pair are merged by summing
/// their weights.
pub struct GraphBuilder {
    n: usize,
    half_edges: Vec<(usize, usize, i64)>,
    node_weights: Option<Vec<i64>>,
}

impl GraphBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            half_edges: Vec::new(),
            node_weights: None,
        }
    }

    /// Adds an undirected edge, i.e. both half-edges.
    pub fn add_edge(&mut self, u: usize, v: usize, weight: i64) {
        assert_ne!(u, v, "use add_self_loop for self loops");
        self.half_edges.push((u, v, weight));
        self.half_edges.push((v, u, weight));
    }

    /// Adds a self loop, stored as a single half-edge.
    pub fn add_self_loop(&mut self, u: usize, weight: i64) {
        self.half_edges.push((u, u, weight));
    }

    /// Adds a single directed half-edge; [`build`](GraphBuilder::build)
    /// rejects the input unless its mirror is added as well.
    pub fn add_half_edge(&mut self, u: usize, v: usize, weight: i64) {
        self.half_edges.push((u, v, weight));
    }

    pub fn set_node_weight(&mut self, u: usize, weight: i64) {
        self.node_weights.get_or_insert_with(|| vec![1; self.n])[u] = weight;
    }

    pub fn set_node_weights(&mut self, weights: Vec<i64>) {
        assert_eq!(weights.len(), self.n);
        self.node_weights = Some(weights);
    }

    /// Builds the graph in natural node order.
    pub fn build(self) -> Result<Graph, Error> {
        let csr = self.into_csr(false)?;
        Ok(Graph::Csr(csr))
    }

    /// Builds the graph with nodes rearranged into degree buckets (ascending,
    /// isolated nodes last). Returns the permutation `perm[old] = new`.
    pub fn build_sorted(self) -> Result<(Graph, Vec<usize>), Error> {
        let csr = self.into_csr(false)?;
        let (csr, perm) = rearrange_by_degree_buckets(csr);
        Ok((Graph::Csr(csr), perm))
    }

    /// Builds the graph trusting that the caller already ordered the nodes by
    /// degree buckets.
    pub fn build_implicit_sorted(self) -> Result<Graph, Error> {
        let csr = self.into_csr(true)?;
        Ok(Graph::Csr(csr))
    }

    fn into_csr(self, sorted: bool) -> Result<Csr, Error> {
        let n = self.n;
        let mut half_edges = self.half_edges;

        for &(u, v, weight) in &half_edges {
            assert!(u < n && v < n, "edge endpoint out of bounds");
            if weight <= 0 {
                return Err(Error::NegativeValues);
            }
        }
        if let Some(weights) = &self.node_weights {
            if weights.iter().any(|&w| w < 0) {
                return Err(Error::NegativeValues);
            }
        }

        half_edges.sort_unstable();
        // Merge parallel edges.
        half_edges.dedup_by(|next, kept| {
            if next.0 == kept.0 && next.1 == kept.1 {
                kept.2 += next.2;
                true
            } else {
                false
            }
        });

        // Every half-edge needs a mirror of equal weight.
        for &(u, v, weight) in &half_edges {
            if u == v {
                continue;
            }
            let mirrored = half_edges
                .binary_search_by_key(&(v, u), |&(a, b, _)| (a, b))
                .map(|i| half_edges[i].2 == weight)
                .unwrap_or(false);
            if !mirrored {
                return Err(Error::Asymmetric);
            }
        }

        let mut nodes = vec![0_usize; n + 1];
        for &(u, _, _) in &half_edges {
            nodes[u + 1] += 1;
        }
        for u in 0..n {
            nodes[u + 1] += nodes[u];
        }

        let edges: Vec<usize> = half_edges.iter().map(|&(_, v, _)| v).collect();
        let has_edge_weights = half_edges.iter().any(|&(_, _, w)| w != 1);
        let edge_weights =
            has_edge_weights.then(|| half_edges.iter().map(|&(_, _, w)| w).collect());

        Ok(Csr::new(nodes, edges, self.node_weights, edge_weights, sorted))
    }
}

/// Rearranges a CSR graph so that nodes appear in ascending degree-bucket
/// order with isolated nodes last. Returns the new graph and the permutation
/// `perm[old] = new`.
pub fn rearrange_by_degree_buckets(csr: Csr) -> (Csr, Vec<usize>) {
    let n = csr.n();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&u| {
        let bucket = degree_bucket(csr.degree(u));
        // isolated nodes move behind every non-empty bucket
        if bucket == 0 {
            usize::MAX
        } else {
            bucket
        }
    });

    let mut perm = vec![0_usize; n];
    for (new, &old) in order.iter().enumerate() {
        perm[old] = new;
    }

    let mut nodes = vec![0_usize; n + 1];
    for (new, &old) in order.iter().enumerate() {
        nodes[new + 1] = csr.degree(old);
    }
    for u in 0..n {
        nodes[u + 1] += nodes[u];
    }

    let mut edges = vec![0_usize; csr.m()];
    let has_edge_weights = csr.edge_weights().is_some();
    let mut edge_weights = has_edge_weights.then(|| vec![0_i64; csr.m()]);
    for (new, &old) in order.iter().enumerate() {
        let mut adjacency: Vec<(usize, i64)> = csr
            .neighbors(old)
            .map(|(e, v)| (perm[v], csr.edge_weight(e)))
            .collect();
        adjacency.sort_unstable();

        let begin = nodes[new];
        for (i, (v, w)) in adjacency.into_iter().enumerate() {
            edges[begin + i] = v;
            if let Some(edge_weights) = &mut edge_weights {
                edge_weights[begin + i] = w;
            }
        }
    }

    let node_weights = csr
        .node_weights()
        .map(|weights| order.iter().map(|&old| weights[old]).collect());

    (Csr::new(nodes, edges, node_weights, edge_weights, true), perm)
}
