//! Test report handling
//!
//! Failure extraction from engine reports and the failure ledgers written
//! for downstream consumers.

mod junit;
mod ledger;

pub use junit::{FailureExtractor, FixtureLayout};
pub use ledger::FailureLedger;
