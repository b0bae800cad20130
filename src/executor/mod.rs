//! Test execution
//!
//! The engine seam, single-batch runs and the per-instance driver.

mod engine;
mod instance;
mod runner;

pub use engine::{CommandEngine, EngineRequest, EngineSettings};
pub use instance::{InstanceRunner, InstanceSettings};
pub use runner::{RunOutcome, TestRunner};

#[cfg(test)]
pub use engine::{EngineExit, TestEngine};
