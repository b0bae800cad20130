//! Run outcome models
//!
//! Failure records, recovery decisions and the aggregated per-batch and
//! per-instance results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How the engine executes a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    Serial,
    Parallel,
}

impl ExecMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecMode::Serial => "serial",
            ExecMode::Parallel => "parallel",
        }
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A failed test and the recording that backs it
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Class-qualified test name
    pub test_id: String,
    pub fixture_path: PathBuf,
}

impl FailureRecord {
    pub fn new(test_id: impl Into<String>, fixture_path: impl Into<PathBuf>) -> Self {
        Self {
            test_id: test_id.into(),
            fixture_path: fixture_path.into(),
        }
    }
}

/// Verdict after the live rerun
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    ConfirmedFailure,
    FlakyRecovered,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::ConfirmedFailure => write!(f, "CONFIRMED_FAILURE"),
            Decision::FlakyRecovered => write!(f, "FLAKY_RECOVERED"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub test_id: String,
    pub decision: Decision,
    pub fixture_changed: bool,
}

/// Recordings rewritten by a live rerun, committed together
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishBatch {
    paths: Vec<PathBuf>,
}

impl PublishBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Result of the publish step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Nothing changed, no commit created
    Skipped,
    Published {
        files: usize,
        attempts: u32,
        branch: Option<String>,
    },
}

/// Everything that happened to one batch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResult {
    pub label: String,
    pub mode: ExecMode,
    pub modules: Vec<String>,
    pub report_path: PathBuf,
    /// Unresolved failures remain after recovery
    pub failed: bool,
    /// Engine produced no report at all
    pub hard_failure: bool,
    /// Failures left as-is because recovery did not run
    pub unrecovered: Vec<String>,
    pub outcomes: Vec<RecoveryOutcome>,
    pub publish: Option<PublishOutcome>,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn new(label: impl Into<String>, mode: ExecMode, modules: Vec<String>) -> Self {
        Self {
            label: label.into(),
            mode,
            modules,
            report_path: PathBuf::new(),
            failed: false,
            hard_failure: false,
            unrecovered: Vec::new(),
            outcomes: Vec::new(),
            publish: None,
            duration_ms: 0,
        }
    }

    pub fn recovered(&self) -> impl Iterator<Item = &RecoveryOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.decision == Decision::FlakyRecovered)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &RecoveryOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.decision == Decision::ConfirmedFailure)
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.hard_failure {
            "CRASH"
        } else if self.failed {
            "FAIL"
        } else {
            "PASS"
        };
        write!(
            f,
            "{} [{}] {} module(s) {} [{}ms]",
            self.label,
            self.mode,
            self.modules.len(),
            status,
            self.duration_ms
        )
    }
}

/// Aggregated result of one worker instance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceReport {
    /// One-based instance index
    pub instance_index: usize,
    pub instance_count: usize,
    pub profile: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub batches: Vec<BatchResult>,
}

impl InstanceReport {
    pub fn new(instance_index: usize, instance_count: usize, profile: impl Into<String>) -> Self {
        Self {
            instance_index,
            instance_count,
            profile: profile.into(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            batches: Vec::new(),
        }
    }

    pub fn push(&mut self, batch: BatchResult) {
        self.batches.push(batch);
        self.completed_at = Utc::now();
    }

    pub fn failed(&self) -> bool {
        self.batches.iter().any(|b| b.failed)
    }

    pub fn exit_code(&self) -> u8 {
        u8::from(self.failed())
    }

    pub fn recovered_tests(&self) -> Vec<String> {
        self.batches
            .iter()
            .flat_map(|b| b.recovered())
            .map(|o| o.test_id.clone())
            .collect()
    }

    pub fn confirmed_failures(&self) -> Vec<String> {
        self.batches
            .iter()
            .flat_map(|b| b.confirmed())
            .map(|o| o.test_id.clone())
            .collect()
    }

    pub fn crashed_modules(&self) -> Vec<String> {
        self.batches
            .iter()
            .filter(|b| b.hard_failure)
            .flat_map(|b| b.modules.iter().cloned())
            .collect()
    }

    pub fn duration_ms(&self) -> u64 {
        self.batches.iter().map(|b| b.duration_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, decision: Decision) -> RecoveryOutcome {
        RecoveryOutcome {
            test_id: id.to_string(),
            decision,
            fixture_changed: decision == Decision::FlakyRecovered,
        }
    }

    #[test]
    fn test_publish_batch_dedups_paths() {
        let mut batch = PublishBatch::new();
        batch.add("pkg/recordings/test_x.yaml");
        batch.add("pkg/recordings/test_x.yaml");
        batch.add("pkg/recordings/test_y.yaml");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_instance_exit_code() {
        let mut report = InstanceReport::new(1, 2, "latest");
        assert_eq!(report.exit_code(), 0);

        let mut ok = BatchResult::new("serial", ExecMode::Serial, vec!["vm".into()]);
        ok.outcomes.push(outcome("a.T.test_a", Decision::FlakyRecovered));
        report.push(ok);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.recovered_tests(), vec!["a.T.test_a"]);

        let mut bad = BatchResult::new("parallel", ExecMode::Parallel, vec!["acr".into()]);
        bad.failed = true;
        bad.outcomes.push(outcome("b.T.test_b", Decision::ConfirmedFailure));
        report.push(bad);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.confirmed_failures(), vec!["b.T.test_b"]);
    }

    #[test]
    fn test_crashed_modules() {
        let mut report = InstanceReport::new(1, 1, "latest");
        let mut crash = BatchResult::new("parallel", ExecMode::Parallel, vec!["x".into()]);
        crash.failed = true;
        crash.hard_failure = true;
        report.push(crash);
        assert_eq!(report.crashed_modules(), vec!["x"]);
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&Decision::FlakyRecovered).unwrap();
        assert_eq!(json, "\"FLAKY_RECOVERED\"");
    }
}
