//! Failure recovery
//!
//! Live rerun of failed tests, recording refresh and publishing.

mod coordinator;

pub use coordinator::{Batch, RecoveryCoordinator, RecoverySettings};
