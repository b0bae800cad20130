//! Error taxonomy for scheduling and recovery
//!
//! Only discovery, configuration and exhausted publish retries abort an
//! instance. Everything else is folded into the instance report.

use std::path::PathBuf;
use thiserror::Error;

use crate::vcs::VcsError;

/// Errors raised by the scheduling and recovery core
#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Module discovery failed: {0}")]
    DiscoveryFailure(String),

    #[error("Test engine exited without a report for modules: {}", .modules.join(", "))]
    ExecutionCrash { modules: Vec<String> },

    #[error("{count} test(s) failed in batch {batch}")]
    TestFailure { batch: String, count: usize },

    #[error("Malformed test report {}: {reason}", .path.display())]
    MalformedReport { path: PathBuf, reason: String },

    #[error("Live rerun reproduced failure of {test_id}")]
    ConfirmedFailure { test_id: String },

    #[error("Publish failed after {attempts} attempts: {reason}")]
    PublishConflict { attempts: u32, reason: String },

    #[error("Version control error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardError {
    /// Whether the error must stop the whole instance
    pub fn is_instance_fatal(&self) -> bool {
        matches!(
            self,
            ShardError::DiscoveryFailure(_)
                | ShardError::PublishConflict { .. }
                | ShardError::Config(_)
        )
    }
}

pub type ShardResult<T> = std::result::Result<T, ShardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ShardError::DiscoveryFailure("empty".into()).is_instance_fatal());
        assert!(ShardError::PublishConflict {
            attempts: 4,
            reason: "rejected".into()
        }
        .is_instance_fatal());
        assert!(!ShardError::MalformedReport {
            path: PathBuf::from("r.xml"),
            reason: "eof".into()
        }
        .is_instance_fatal());
        assert!(!ShardError::ConfirmedFailure {
            test_id: "a.b".into()
        }
        .is_instance_fatal());
        assert!(!ShardError::TestFailure {
            batch: "parallel".into(),
            count: 2
        }
        .is_instance_fatal());
    }

    #[test]
    fn test_crash_message_lists_modules() {
        let err = ShardError::ExecutionCrash {
            modules: vec!["vm".into(), "network".into()],
        };
        assert_eq!(
            err.to_string(),
            "Test engine exited without a report for modules: vm, network"
        );
    }
}
