//! Boundary interfaces for distributed execution.
//!
//! In a multi-process setting every process owns a contiguous node range and
//! keeps ghost copies of interface nodes owned by its peers. The exchange
//! itself (a sparse all-to-all parameterized by a send predicate and a
//! per-node message builder, plus foreign-id translation) lives outside this
//! crate; the refiners only call the hooks below at their synchronization
//! points. Shared-memory runs pass no exchange and skip the hooks entirely.

use crate::partition::PartitionedGraph;

/// A move proposal for an interface node, as exchanged between processes.
#[derive(Clone, Copy, Debug)]
pub struct MoveCandidate {
    pub node: usize,
    pub gain: i64,
    pub target: usize,
}

pub trait GhostExchange {
    /// Sends the proposals of interface nodes to their peers and writes the
    /// received ghost proposals directly into `gains_and_targets`.
    fn synchronize_move_candidates(
        &mut self,
        p_graph: &PartitionedGraph,
        gains_and_targets: &mut [(i64, usize)],
    );

    /// Sends the new labels of the nodes moved in this pass (those with
    /// `moved(u)`) to the peers holding ghosts of them.
    fn synchronize_labels(&mut self, p_graph: &PartitionedGraph, moved: &(dyn Fn(usize) -> bool + Sync));

    /// Sums the per-process block weight deltas; every process continues with
    /// the global deltas.
    fn allreduce_block_weight_deltas(&mut self, deltas: &mut [i64]);
}
