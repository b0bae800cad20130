//! Work scheduling
//!
//! Weighs modules by historical runtime, balances them across worker
//! instances, and splits each worker's share into serial and parallel batches.

mod classify;
mod partition;
mod weights;

pub use classify::BatchClassifier;
pub use partition::GreedyPartitioner;
pub use weights::{CostTable, WeightedJobSet};
