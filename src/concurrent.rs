// Shared-memory primitives used by the coarsening and refinement phases.

mod circular;
mod fast_reset;
mod rating_map;

pub use circular::CircularPrefixSum;
pub use fast_reset::{ConcurrentFastResetArray, FastResetArray};
pub use rating_map::RatingMap;
