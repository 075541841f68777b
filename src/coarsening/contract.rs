use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::concurrent::{CircularPrefixSum, RatingMap};
use crate::graph::{Csr, Graph};

// Coarse nodes per aggregation chunk.
const CONTRACT_CHUNK: usize = 2048;

/// Contracts `graph` according to `clustering`: all nodes of a cluster merge
/// into one coarse node, parallel coarse edges are summed, intra-cluster
/// edges disappear.
///
/// Returns the coarse graph and the fine-to-coarse mapping. The coarse node
/// ids are the used cluster ids compacted into `[0, n')` in ascending order,
/// so the result does not depend on scheduling.
pub fn contract_clustering(graph: &Graph, clustering: &[usize]) -> (Csr, Vec<usize>) {
    let n = graph.n();
    debug_assert_eq!(clustering.len(), n);

    // Compact the used cluster ids.
    let used: Vec<AtomicU8> = (0..n).map(|_| AtomicU8::new(0)).collect();
    clustering.par_iter().for_each(|&cluster| {
        used[cluster].store(1, Ordering::Relaxed);
    });

    let mut remap = vec![0_usize; n];
    let mut c_n = 0;
    for cluster in 0..n {
        if used[cluster].load(Ordering::Relaxed) != 0 {
            remap[cluster] = c_n;
            c_n += 1;
        }
    }

    let mapping: Vec<usize> = clustering.par_iter().map(|&cluster| remap[cluster]).collect();

    // Coarse node weights.
    let c_node_weights: Vec<AtomicI64> = (0..c_n).map(|_| AtomicI64::new(0)).collect();
    (0..n).into_par_iter().for_each(|u| {
        c_node_weights[mapping[u]].fetch_add(graph.node_weight(u), Ordering::Relaxed);
    });

    // Bucket-sort fine nodes by their coarse node.
    let mut bucket_offsets = vec![0_usize; c_n + 1];
    for &c in &mapping {
        bucket_offsets[c + 1] += 1;
    }
    for c in 0..c_n {
        bucket_offsets[c + 1] += bucket_offsets[c];
    }
    let mut positions = bucket_offsets.clone();
    let mut members = vec![0_usize; n];
    for u in 0..n {
        members[positions[mapping[u]]] = u;
        positions[mapping[u]] += 1;
    }

    // Aggregate coarse adjacencies chunk by chunk. Each chunk claims a range
    // of the scratch edge array through the circular prefix sum: tickets are
    // drawn when a chunk starts, so a chunk only ever waits on chunks that
    // are already running.
    let m = graph.m();
    let scratch_edges: Vec<AtomicUsize> = (0..m).map(|_| AtomicUsize::new(0)).collect();
    let scratch_weights: Vec<AtomicI64> = (0..m).map(|_| AtomicI64::new(0)).collect();
    let scratch_starts: Vec<AtomicUsize> = (0..c_n).map(|_| AtomicUsize::new(0)).collect();
    let c_degrees: Vec<AtomicUsize> = (0..c_n).map(|_| AtomicUsize::new(0)).collect();

    let offsets = CircularPrefixSum::new(rayon::current_num_threads().next_power_of_two());

    let chunk_starts: Vec<usize> = (0..c_n).step_by(CONTRACT_CHUNK).collect();
    chunk_starts.par_iter().for_each_init(
        || RatingMap::new(c_n),
        |map, &chunk_begin| {
            let chunk_end = (chunk_begin + CONTRACT_CHUNK).min(c_n);

            let mut pairs: Vec<(usize, i64)> = Vec::new();
            let mut degrees: Vec<usize> = Vec::with_capacity(chunk_end - chunk_begin);
            for c in chunk_begin..chunk_end {
                let begin = pairs.len();
                let cluster = &members[bucket_offsets[c]..bucket_offsets[c + 1]];

                let degree_sum: usize = cluster.iter().map(|&u| graph.degree(u)).sum();
                map.update_upper_bound(degree_sum.min(c_n));
                for &u in cluster {
                    for (e, v) in graph.neighbors(u) {
                        let cv = mapping[v];
                        if cv != c {
                            map.add(cv, graph.edge_weight(e));
                        }
                    }
                }
                map.for_each(|cv, weight| pairs.push((cv, weight)));
                map.clear();

                // hash order is not stable; sort for a scheduling-independent
                // coarse graph
                pairs[begin..].sort_unstable();
                degrees.push(pairs.len() - begin);
            }

            let ticket = offsets.next();
            let offset = offsets.fetch_and_update(ticket, pairs.len() as i64) as usize;

            for (i, &(cv, weight)) in pairs.iter().enumerate() {
                scratch_edges[offset + i].store(cv, Ordering::Relaxed);
                scratch_weights[offset + i].store(weight, Ordering::Relaxed);
            }
            let mut start = offset;
            for (c, &degree) in (chunk_begin..chunk_end).zip(&degrees) {
                scratch_starts[c].store(start, Ordering::Relaxed);
                c_degrees[c].store(degree, Ordering::Relaxed);
                start += degree;
            }
        },
    );

    // Scratch ranges follow ticket order; lay the final CSR out in coarse
    // node order.
    let mut c_nodes = vec![0_usize; c_n + 1];
    for c in 0..c_n {
        c_nodes[c + 1] = c_nodes[c] + c_degrees[c].load(Ordering::Relaxed);
    }
    let c_m = c_nodes[c_n];

    let c_edges: Vec<AtomicUsize> = (0..c_m).map(|_| AtomicUsize::new(0)).collect();
    let c_edge_weights: Vec<AtomicI64> = (0..c_m).map(|_| AtomicI64::new(0)).collect();
    (0..c_n).into_par_iter().for_each(|c| {
        let src = scratch_starts[c].load(Ordering::Relaxed);
        let dst = c_nodes[c];
        for i in 0..c_degrees[c].load(Ordering::Relaxed) {
            c_edges[dst + i].store(scratch_edges[src + i].load(Ordering::Relaxed), Ordering::Relaxed);
            c_edge_weights[dst + i]
                .store(scratch_weights[src + i].load(Ordering::Relaxed), Ordering::Relaxed);
        }
    });

    let c_edges: Vec<usize> = c_edges.into_iter().map(AtomicUsize::into_inner).collect();
    let c_edge_weights: Vec<i64> =
        c_edge_weights.into_iter().map(AtomicI64::into_inner).collect();
    let c_node_weights: Vec<i64> =
        c_node_weights.into_iter().map(AtomicI64::into_inner).collect();

    let coarse = Csr::new(
        c_nodes,
        c_edges,
        Some(c_node_weights),
        Some(c_edge_weights),
        false,
    );

    debug_assert_eq!(
        coarse_total_node_weight(&coarse),
        graph.total_node_weight(),
        "contraction must preserve the total node weight"
    );

    (coarse, mapping)
}

fn coarse_total_node_weight(coarse: &Csr) -> i64 {
    (0..coarse.n()).map(|c| coarse.node_weight(c)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;

    fn weighted_path() -> Graph {
        let mut builder = GraphBuilder::new(6);
        builder.add_edge(0, 1, 2);
        builder.add_edge(1, 2, 3);
        builder.add_edge(2, 3, 4);
        builder.add_edge(3, 4, 5);
        builder.add_edge(4, 5, 6);
        builder.build().unwrap()
    }

    #[test]
    fn test_contract_pairs() {
        let graph = weighted_path();
        // merge {0,1}, {2,3}, {4,5}
        let clustering = vec![0, 0, 2, 2, 4, 4];
        let (coarse, mapping) = contract_clustering(&graph, &clustering);

        assert_eq!(coarse.n(), 3);
        assert_eq!(mapping, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(coarse.node_weight(0), 2);
        assert_eq!(coarse.node_weight(1), 2);

        // coarse edges: (0,1) with weight 3, (1,2) with weight 5
        let adjacency: Vec<(usize, i64)> = coarse
            .neighbors(1)
            .map(|(e, v)| (v, coarse.edge_weight(e)))
            .collect();
        assert_eq!(adjacency, vec![(0, 3), (2, 5)]);
    }

    #[test]
    fn test_parallel_coarse_edges_are_summed() {
        // a 4-cycle contracted into two coarse nodes: the two crossing edges
        // become one coarse edge of combined weight
        let mut builder = GraphBuilder::new(4);
        builder.add_edge(0, 1, 1);
        builder.add_edge(1, 2, 2);
        builder.add_edge(2, 3, 1);
        builder.add_edge(3, 0, 4);
        let graph = builder.build().unwrap();

        let clustering = vec![0, 0, 2, 2];
        let (coarse, _mapping) = contract_clustering(&graph, &clustering);

        assert_eq!(coarse.n(), 2);
        assert_eq!(coarse.m(), 2);
        let adjacency: Vec<(usize, i64)> = coarse
            .neighbors(0)
            .map(|(e, v)| (v, coarse.edge_weight(e)))
            .collect();
        assert_eq!(adjacency, vec![(1, 6)]);
    }

    #[test]
    fn test_total_edge_weight_never_increases() {
        let graph = weighted_path();
        let total: i64 = (0..graph.n())
            .flat_map(|u| graph.neighbors(u).map(|(e, _)| graph.edge_weight(e)).collect::<Vec<_>>())
            .sum();

        for clustering in [
            vec![0, 0, 0, 3, 3, 3],
            vec![0, 1, 2, 3, 4, 5],
            vec![5, 5, 5, 5, 5, 5],
        ] {
            let (coarse, _) = contract_clustering(&graph, &clustering);
            let coarse_total: i64 = (0..coarse.n())
                .flat_map(|c| {
                    coarse.neighbors(c).map(|(e, _)| coarse.edge_weight(e)).collect::<Vec<_>>()
                })
                .sum();
            assert!(coarse_total <= total);
            assert_eq!(coarse_total_node_weight(&coarse), graph.total_node_weight());
        }
    }

    #[test]
    fn test_trivial_clustering_keeps_the_graph() {
        let graph = weighted_path();
        let clustering: Vec<usize> = (0..graph.n()).collect();
        let (coarse, mapping) = contract_clustering(&graph, &clustering);

        assert_eq!(coarse.n(), graph.n());
        assert_eq!(coarse.m(), graph.m());
        assert_eq!(mapping, clustering);
        for u in 0..graph.n() {
            let a: Vec<(usize, i64)> =
                graph.neighbors(u).map(|(e, v)| (v, graph.edge_weight(e))).collect();
            let b: Vec<(usize, i64)> =
                coarse.neighbors(u).map(|(e, v)| (v, coarse.edge_weight(e))).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_cluster_ids_need_not_be_compact() {
        let graph = weighted_path();
        let clustering = vec![5, 5, 3, 3, 1, 1];
        let (coarse, mapping) = contract_clustering(&graph, &clustering);

        assert_eq!(coarse.n(), 3);
        // compacted in order of the smallest cluster id
        assert_eq!(mapping, vec![2, 2, 1, 1, 0, 0]);
    }
}
