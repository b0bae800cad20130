//! Publishing refreshed recordings
//!
//! Commits the recordings rewritten by live reruns and pushes them to the
//! shared remote. Several instances publish into the same window, so the
//! fetch/rebase/push sequence is retried with a fixed backoff. The commit
//! itself is never retried and nothing is ever force-pushed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::git::{VcsError, VersionControl};
use crate::error::{ShardError, ShardResult};
use crate::models::{PublishBatch, PublishOutcome};

/// Retry policy for the fetch/rebase/push sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(10),
        }
    }
}

/// What a publish commit is about; rendered to strings only at the git boundary
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    /// One-based instance index
    pub instance_index: usize,
    /// File name of the report the reruns came from
    pub report_file: String,
    /// Set when publishing per module on a dedicated branch
    pub modules: Vec<String>,
    pub build_id: Option<String>,
}

impl CommitDescriptor {
    pub fn new(instance_index: usize, report_file: impl Into<String>) -> Self {
        Self {
            instance_index,
            report_file: report_file.into(),
            modules: Vec::new(),
            build_id: None,
        }
    }

    pub fn with_modules(mut self, modules: Vec<String>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_build_id(mut self, build_id: Option<String>) -> Self {
        self.build_id = build_id;
        self
    }

    pub fn message(&self) -> String {
        format!(
            "Rerun tests from instance {}. See {} for details",
            self.instance_index, self.report_file
        )
    }

    /// Dedicated branch, only for per-module publishing
    pub fn branch_name(&self, prefix: &str) -> Option<String> {
        if self.modules.is_empty() {
            return None;
        }
        let modules = self.modules.join("_");
        Some(match &self.build_id {
            Some(build) => format!("{prefix}_{build}_{modules}"),
            None => format!("{prefix}_{modules}"),
        })
    }
}

pub struct Publisher {
    vcs: Arc<dyn VersionControl>,
    policy: RetryPolicy,
    remote: String,
    branch_prefix: String,
}

impl Publisher {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self {
            vcs,
            policy: RetryPolicy::default(),
            remote: "origin".to_string(),
            branch_prefix: "regression_test".to_string(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = prefix.into();
        self
    }

    /// Commit and push `batch`; skipped entirely when nothing changed
    pub async fn publish(
        &self,
        batch: &PublishBatch,
        descriptor: &CommitDescriptor,
    ) -> ShardResult<PublishOutcome> {
        if batch.is_empty() {
            info!("No recordings changed, skipping publish");
            return Ok(PublishOutcome::Skipped);
        }

        self.vcs.add(batch.paths()).await?;
        if !self.vcs.has_staged_changes().await? {
            info!("Staged recordings are identical to HEAD, skipping publish");
            return Ok(PublishOutcome::Skipped);
        }

        let branch = descriptor.branch_name(&self.branch_prefix);
        if let Some(branch) = &branch {
            info!("Publishing on branch {}", branch);
            self.vcs.checkout_new_branch(branch).await?;
            self.vcs.push_set_upstream(&self.remote, branch).await?;
        }

        self.vcs.commit(&descriptor.message()).await?;
        info!("Committed {} recording(s): {}", batch.len(), descriptor.message());

        let attempts = self.push_with_retry().await?;
        info!("Pushed recordings after {} attempt(s)", attempts);

        Ok(PublishOutcome::Published {
            files: batch.len(),
            attempts,
            branch,
        })
    }

    async fn push_with_retry(&self) -> ShardResult<u32> {
        let max_attempts = self.policy.max_retries + 1;
        let mut attempt = 1;
        loop {
            match self.sync_and_push().await {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt >= max_attempts => {
                    return Err(ShardError::PublishConflict {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Push attempt {}/{} failed: {}; retrying in {}s",
                        attempt,
                        max_attempts,
                        e,
                        self.policy.backoff.as_secs()
                    );
                    sleep(self.policy.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn sync_and_push(&self) -> Result<(), VcsError> {
        self.vcs.fetch().await?;
        if let Err(e) = self.vcs.pull_rebase().await {
            if let Err(abort) = self.vcs.abort_rebase().await {
                warn!("Could not abort rebase: {}", abort);
            }
            return Err(e);
        }
        self.vcs.push().await
    }
}
