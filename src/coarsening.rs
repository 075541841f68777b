pub mod coarsener;
pub mod contract;

pub use coarsener::Coarsener;
pub use contract::contract_clustering;
