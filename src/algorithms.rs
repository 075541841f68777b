// This file has code from https://github.com/LIHPC-Computational-Geometry/coupe
use std::fmt;

use crate::partition::{PartitionContext, PartitionedGraph};

mod balancer;
mod greedy;
mod jet_refiner;
mod lp_clusterer;
mod lp_refiner;
mod multilevel_partitioner;

pub use balancer::GreedyBalancer;
pub use greedy::Greedy;
pub use jet_refiner::JetRefiner;
pub use lp_clusterer::LpClusterer;
pub use lp_refiner::LpRefiner;
pub use multilevel_partitioner::{MultiLevelPartitioner, PartitionReport};

/// Common errors thrown by algorithms.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No partition that matches the given criteria could been found.
    NotFound,

    /// Input sets don't have matching lengths.
    InputLenMismatch { expected: usize, actual: usize },

    /// Input contains negative values and such values are not supported.
    NegativeValues,

    /// Input adjacency misses the mirror of a half-edge or assigns the two
    /// directions different weights.
    Asymmetric,

    /// When a partition improving algorithm is given more than 2 parts.
    BiPartitioningOnly,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "no partition found"),
            Error::InputLenMismatch { expected, actual } => write!(
                f,
                "input sets don't have the same length (expected {expected} items, got {actual})",
            ),
            Error::NegativeValues => write!(f, "input contains negative values"),
            Error::Asymmetric => write!(f, "input graph is not symmetric"),
            Error::BiPartitioningOnly => write!(f, "expected no more than two parts"),
        }
    }
}

impl std::error::Error for Error {}

/// Refinement pass over an existing partition.
///
/// `initialize` resets per-pass state (snapshots, locks, deltas) for the
/// given partition; `refine` runs the algorithm and returns `true` iff the
/// edge cut strictly decreased.
pub trait Refine {
    fn initialize(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext);

    fn refine(&mut self, p_graph: &PartitionedGraph, p_ctx: &PartitionContext) -> bool;
}
