//! Data models for sharded test runs
//!
//! This module contains all data structures used throughout the application.

mod job;
mod outcome;

pub use job::{Job, Partition, WorkerAssignment};
pub use outcome::{
    BatchResult, Decision, ExecMode, FailureRecord, InstanceReport, PublishBatch,
    PublishOutcome, RecoveryOutcome,
};
