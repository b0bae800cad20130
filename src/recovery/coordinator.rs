//! Selective live rerun of failed tests
//!
//! Per batch: `RAN -> DONE` when nothing failed or live rerun is off;
//! otherwise `RAN -> RERUNNING -> DECIDING -> PUBLISHING -> DONE`.
//! Recordings of tests that pass live are kept and published; recordings of
//! tests that fail again are put back to their committed content.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ShardError, ShardResult};
use crate::executor::{EngineRequest, RunOutcome, TestRunner};
use crate::models::{
    BatchResult, Decision, ExecMode, FailureRecord, PublishBatch, RecoveryOutcome,
};
use crate::report::{FailureExtractor, FailureLedger};
use crate::vcs::{CommitDescriptor, Publisher, VersionControl};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryState {
    Ran,
    Rerunning,
    Deciding,
    Publishing,
    Done,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryState::Ran => "RAN",
            RecoveryState::Rerunning => "RERUNNING",
            RecoveryState::Deciding => "DECIDING",
            RecoveryState::Publishing => "PUBLISHING",
            RecoveryState::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct RecoverySettings {
    pub live_rerun: bool,
    pub profile: String,
    pub rerun_extra_flags: String,
    /// Root that relative recording paths resolve against
    pub workdir: PathBuf,
}

/// One engine run over a set of modules
#[derive(Clone, Debug)]
pub struct Batch {
    pub label: String,
    pub modules: Vec<String>,
    pub mode: ExecMode,
    pub report_path: PathBuf,
    pub extra_flags: String,
    pub fanout: usize,
    pub descriptor: CommitDescriptor,
}

impl Batch {
    fn request(&self, profile: &str) -> EngineRequest {
        EngineRequest {
            targets: self.modules.clone(),
            mode: self.mode,
            live: false,
            profile: profile.to_string(),
            report_path: self.report_path.clone(),
            extra_flags: self.extra_flags.clone(),
            fanout: self.fanout,
        }
    }

    /// Sibling report for the live rerun
    pub fn rerun_report_path(&self) -> PathBuf {
        let stem = self
            .report_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        self.report_path.with_file_name(format!("{stem}.live.xml"))
    }
}

pub struct RecoveryCoordinator {
    runner: TestRunner,
    extractor: FailureExtractor,
    vcs: Arc<dyn VersionControl>,
    publisher: Publisher,
    ledger: FailureLedger,
    settings: RecoverySettings,
}

impl RecoveryCoordinator {
    pub fn new(
        runner: TestRunner,
        extractor: FailureExtractor,
        vcs: Arc<dyn VersionControl>,
        publisher: Publisher,
        ledger: FailureLedger,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            runner,
            extractor,
            vcs,
            publisher,
            ledger,
            settings,
        }
    }

    pub fn runner(&self) -> &TestRunner {
        &self.runner
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Run a batch and recover its failures.
    ///
    /// Only publish errors are returned; every other problem ends up in the
    /// batch result.
    pub async fn process(&self, batch: &Batch) -> ShardResult<BatchResult> {
        let mut result = BatchResult::new(&batch.label, batch.mode, batch.modules.clone());
        result.report_path = batch.report_path.clone();

        let ran = self.runner.run(&batch.request(&self.settings.profile)).await;
        result.duration_ms = ran.duration_ms;
        self.transition(batch, RecoveryState::Ran);

        if !ran.failed {
            self.transition(batch, RecoveryState::Done);
            return Ok(result);
        }
        result.failed = true;

        if ran.hard_failure() {
            result.hard_failure = true;
            let crash = ShardError::ExecutionCrash {
                modules: batch.modules.clone(),
            };
            warn!("[{}] {}", batch.label, crash);
            if let Err(e) = self.ledger.record_crash(&batch.modules) {
                warn!("Could not record crashed modules: {:#}", e);
            }
            self.transition(batch, RecoveryState::Done);
            return Ok(result);
        }

        let failures = match self.extractor.extract(&ran.report_path) {
            Ok(failures) => failures,
            Err(e) => {
                warn!("[{}] recovery aborted: {}", batch.label, e);
                self.transition(batch, RecoveryState::Done);
                return Ok(result);
            }
        };
        result.unrecovered = failures.iter().map(|f| f.test_id.clone()).collect();

        if failures.is_empty() {
            warn!(
                "[{}] engine failed but the report has no failed tests",
                batch.label
            );
            self.transition(batch, RecoveryState::Done);
            return Ok(result);
        }
        warn!(
            "{}",
            ShardError::TestFailure {
                batch: batch.label.clone(),
                count: failures.len(),
            }
        );
        if !self.settings.live_rerun {
            info!("[{}] live rerun disabled, reporting as is", batch.label);
            self.transition(batch, RecoveryState::Done);
            return Ok(result);
        }

        let mut snapshots = self.snapshot(&failures).await;

        self.transition(batch, RecoveryState::Rerunning);
        let rerun = self.rerun(batch, &failures).await;
        result.duration_ms += rerun.duration_ms;

        self.transition(batch, RecoveryState::Deciding);
        let recovered = self.passed_live(&rerun, &failures);
        let mut publish = PublishBatch::new();

        for (failure, (path, before)) in failures.iter().zip(snapshots.iter_mut()) {
            if before.is_none() {
                // the live run may have created the recording somewhere else
                *path = self.locate(&failure.fixture_path).await;
            }

            let outcome = if recovered.contains(&failure.test_id) {
                let changed = fs::read(&*path).ok() != *before;
                if changed {
                    publish.add(&*path);
                }
                RecoveryOutcome {
                    test_id: failure.test_id.clone(),
                    decision: Decision::FlakyRecovered,
                    fixture_changed: changed,
                }
            } else {
                let confirmed = ShardError::ConfirmedFailure {
                    test_id: failure.test_id.clone(),
                };
                warn!("[{}] {}", batch.label, confirmed);
                self.restore(path.as_path(), before.is_some()).await;
                if let Err(e) = self.ledger.record_confirmed_failure(&failure.test_id) {
                    warn!("Could not record confirmed failure: {:#}", e);
                }
                RecoveryOutcome {
                    test_id: failure.test_id.clone(),
                    decision: Decision::ConfirmedFailure,
                    fixture_changed: false,
                }
            };
            info!(
                "[{}] {} -> {}{}",
                batch.label,
                outcome.test_id,
                outcome.decision,
                if outcome.fixture_changed {
                    " (recording refreshed)"
                } else {
                    ""
                }
            );
            result.outcomes.push(outcome);
        }
        result.unrecovered.clear();
        result.failed = result
            .outcomes
            .iter()
            .any(|o| o.decision == Decision::ConfirmedFailure);

        self.transition(batch, RecoveryState::Publishing);
        let published = self.publisher.publish(&publish, &batch.descriptor).await?;
        result.publish = Some(published);

        self.transition(batch, RecoveryState::Done);
        Ok(result)
    }

    fn transition(&self, batch: &Batch, state: RecoveryState) {
        info!("[{}] {}", batch.label, state);
    }

    /// Recording in the working tree, found by suffix since the report's
    /// paths are relative to the engine's root rather than the repository's
    async fn locate(&self, fixture: &Path) -> PathBuf {
        match self.vcs.locate(fixture).await {
            Ok(Some(found)) => self.settings.workdir.join(found),
            Ok(None) => self.settings.workdir.join(fixture),
            Err(e) => {
                warn!("Could not locate {}: {}", fixture.display(), e);
                self.settings.workdir.join(fixture)
            }
        }
    }

    /// Location and content of each recording before the live rerun,
    /// in the order of `failures`; content is `None` when absent
    async fn snapshot(&self, failures: &[FailureRecord]) -> Vec<(PathBuf, Option<Vec<u8>>)> {
        let mut snapshots = Vec::with_capacity(failures.len());
        for failure in failures {
            let path = self.locate(&failure.fixture_path).await;
            let content = fs::read(&path).ok();
            snapshots.push((path, content));
        }
        snapshots
    }

    async fn rerun(&self, batch: &Batch, failures: &[FailureRecord]) -> RunOutcome {
        let request = EngineRequest {
            targets: failures.iter().map(|f| f.test_id.clone()).collect(),
            mode: ExecMode::Serial,
            live: true,
            profile: self.settings.profile.clone(),
            report_path: batch.rerun_report_path(),
            extra_flags: self.settings.rerun_extra_flags.clone(),
            fanout: 1,
        };
        self.runner.run(&request).await
    }

    /// Failed tests the live rerun reports as passed.
    ///
    /// A test only counts when the rerun report lists it without any failure,
    /// error or skip marker. A rerun that failed without reporting a single
    /// failed case recovers nothing.
    fn passed_live(&self, rerun: &RunOutcome, failures: &[FailureRecord]) -> BTreeSet<String> {
        if !rerun.report_present {
            warn!("Live rerun produced no report, confirming all failures");
            return BTreeSet::new();
        }
        let cases = match self.extractor.read(&rerun.report_path) {
            Ok(cases) => cases,
            Err(e) => {
                warn!("Live rerun report unusable ({}), confirming all failures", e);
                return BTreeSet::new();
            }
        };
        if rerun.failed && cases.failed.is_empty() {
            warn!("Live rerun failed without failed cases, confirming all failures");
            return BTreeSet::new();
        }
        failures
            .iter()
            .map(|f| f.test_id.clone())
            .filter(|id| cases.passed.contains(id))
            .collect()
    }

    /// Put a recording back to its pre-run state
    async fn restore(&self, path: &Path, existed: bool) {
        if !existed {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Could not remove new recording {}: {}", path.display(), e);
                }
            }
            return;
        }
        if let Err(e) = self.vcs.restore(path).await {
            warn!("Could not restore {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublishOutcome;
    use crate::testing::{junit, FakeVcs, ScriptedEngine, ScriptedStep};
    use crate::vcs::RetryPolicy;
    use std::time::Duration;
    use tempfile::TempDir;

    const TEST_X: (&str, &str, &str) = ("pkg.TestFoo", "test_x", "pkg/test_foo.py");
    const TEST_Y: (&str, &str, &str) = ("pkg.TestFoo", "test_y", "pkg/test_foo.py");
    const TEST_Z: (&str, &str, &str) = ("pkg.TestFoo", "test_z", "pkg/test_foo.py");

    struct Harness {
        dir: TempDir,
        vcs: Arc<FakeVcs>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let vcs = Arc::new(
                FakeVcs::new()
                    .with_committed(dir.path().join("pkg/recordings/test_x.yaml"), "recorded: x\n")
                    .with_committed(dir.path().join("pkg/recordings/test_y.yaml"), "recorded: y\n"),
            );
            Self { dir, vcs }
        }

        fn fixture(&self, name: &str) -> PathBuf {
            self.dir.path().join("pkg/recordings").join(name)
        }

        fn ledger(&self) -> FailureLedger {
            FailureLedger::new(self.dir.path().join("out"), 1)
        }

        fn batch(&self) -> Batch {
            Batch {
                label: "parallel".to_string(),
                modules: vec!["pkg".to_string()],
                mode: ExecMode::Parallel,
                report_path: self.dir.path().join("out/test_results_latest_1.parallel.xml"),
                extra_flags: String::new(),
                fanout: 4,
                descriptor: CommitDescriptor::new(1, "test_results_latest_1.parallel.xml"),
            }
        }

        fn coordinator(&self, engine: &Arc<ScriptedEngine>, live_rerun: bool) -> RecoveryCoordinator {
            let publisher = Publisher::new(self.vcs.clone()).with_policy(RetryPolicy {
                max_retries: 3,
                backoff: Duration::ZERO,
            });
            RecoveryCoordinator::new(
                TestRunner::new(engine.clone()),
                FailureExtractor::default(),
                self.vcs.clone(),
                publisher,
                self.ledger(),
                RecoverySettings {
                    live_rerun,
                    profile: "latest".to_string(),
                    rerun_extra_flags: "-o junit_family=xunit1".to_string(),
                    workdir: self.dir.path().to_path_buf(),
                },
            )
        }
    }

    fn engine(steps: Vec<ScriptedStep>) -> Arc<ScriptedEngine> {
        Arc::new(ScriptedEngine::new(steps))
    }

    #[tokio::test]
    async fn test_clean_run_is_done_immediately() {
        let h = Harness::new();
        let engine = engine(vec![ScriptedStep::pass(junit(&[], &[TEST_X]))]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(!result.failed);
        assert!(result.outcomes.is_empty());
        assert_eq!(result.publish, None);
        assert_eq!(engine.requests().len(), 1);
        assert!(h.vcs.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failures_reported_as_is_without_live_rerun() {
        let h = Harness::new();
        let engine = engine(vec![ScriptedStep::fail(junit(&[TEST_X], &[]))]);
        let result = h.coordinator(&engine, false).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert_eq!(result.unrecovered, vec!["pkg.TestFoo.test_x"]);
        assert_eq!(engine.requests().len(), 1);
        assert!(h.vcs.calls().is_empty());
    }

    #[tokio::test]
    async fn test_flaky_failure_is_recovered_and_published() {
        let h = Harness::new();
        let fixture = h.fixture("test_x.yaml");
        let before = fs::read(&fixture).unwrap();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X], &[])),
            ScriptedStep::pass(junit(&[], &[TEST_X])).writing(&fixture, "recorded: fresh\n"),
        ]);

        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(!result.failed);
        assert_eq!(
            result.outcomes,
            vec![RecoveryOutcome {
                test_id: "pkg.TestFoo.test_x".to_string(),
                decision: Decision::FlakyRecovered,
                fixture_changed: true,
            }]
        );
        assert_ne!(fs::read(&fixture).unwrap(), before);
        assert!(h.vcs.calls().contains(&format!("add {}", fixture.display())));
        assert_eq!(
            h.vcs.commits(),
            vec!["Rerun tests from instance 1. See test_results_latest_1.parallel.xml for details"]
        );
        assert!(matches!(
            result.publish,
            Some(PublishOutcome::Published { files: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_rerun_targets_exactly_the_failed_tests() {
        let h = Harness::new();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X, TEST_Y], &[TEST_Z])),
            ScriptedStep::pass(junit(&[], &[TEST_X, TEST_Y])),
        ]);
        h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        let requests = engine.requests();
        assert_eq!(requests.len(), 2);
        let rerun = &requests[1];
        assert!(rerun.live);
        assert_eq!(rerun.mode, ExecMode::Serial);
        assert_eq!(rerun.targets, vec!["pkg.TestFoo.test_x", "pkg.TestFoo.test_y"]);
        assert_eq!(rerun.extra_flags, "-o junit_family=xunit1");
        assert!(rerun
            .report_path
            .ends_with("test_results_latest_1.parallel.live.xml"));
    }

    #[tokio::test]
    async fn test_confirmed_failure_restores_recording() {
        let h = Harness::new();
        let fixture = h.fixture("test_x.yaml");
        let before = fs::read(&fixture).unwrap();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X], &[])),
            ScriptedStep::fail(junit(&[TEST_X], &[])).writing(&fixture, "partial rewrite"),
        ]);

        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert_eq!(result.outcomes[0].decision, Decision::ConfirmedFailure);
        assert!(!result.outcomes[0].fixture_changed);
        assert_eq!(fs::read(&fixture).unwrap(), before);
        assert!(h.vcs.commits().is_empty());
        assert_eq!(result.publish, Some(PublishOutcome::Skipped));
        assert_eq!(
            h.ledger().confirmed_failures().unwrap(),
            vec!["pkg.TestFoo.test_x"]
        );
    }

    #[tokio::test]
    async fn test_mixed_outcomes_publish_only_recovered() {
        let h = Harness::new();
        let x = h.fixture("test_x.yaml");
        let y = h.fixture("test_y.yaml");
        let y_before = fs::read(&y).unwrap();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X, TEST_Y], &[])),
            ScriptedStep::fail(junit(&[TEST_Y], &[TEST_X]))
                .writing(&x, "recorded: fresh x\n")
                .writing(&y, "recorded: broken y\n"),
        ]);

        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        let decisions: Vec<_> = result
            .outcomes
            .iter()
            .map(|o| (o.test_id.as_str(), o.decision))
            .collect();
        assert_eq!(
            decisions,
            vec![
                ("pkg.TestFoo.test_x", Decision::FlakyRecovered),
                ("pkg.TestFoo.test_y", Decision::ConfirmedFailure),
            ]
        );
        assert_eq!(fs::read(&y).unwrap(), y_before);
        let adds: Vec<_> = h
            .vcs
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("add "))
            .collect();
        assert_eq!(adds, vec![format!("add {}", x.display())]);
    }

    #[tokio::test]
    async fn test_recovered_without_rewrite_creates_no_commit() {
        let h = Harness::new();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X], &[])),
            ScriptedStep::pass(junit(&[], &[TEST_X])),
        ]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(!result.failed);
        assert_eq!(result.outcomes[0].decision, Decision::FlakyRecovered);
        assert!(!result.outcomes[0].fixture_changed);
        assert_eq!(result.publish, Some(PublishOutcome::Skipped));
        assert!(h.vcs.calls().is_empty());
    }

    #[tokio::test]
    async fn test_crash_is_hard_failure_without_rerun() {
        let h = Harness::new();
        let engine = engine(vec![ScriptedStep::crash()]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert!(result.hard_failure);
        assert_eq!(engine.requests().len(), 1);
        assert_eq!(h.ledger().crashed_modules().unwrap(), vec!["pkg"]);
    }

    #[tokio::test]
    async fn test_unavailable_engine_is_hard_failure() {
        let h = Harness::new();
        let engine = engine(vec![ScriptedStep::unavailable()]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.hard_failure);
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_report_aborts_recovery_only() {
        let h = Harness::new();
        let engine = engine(vec![ScriptedStep::fail("not xml at all")]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert!(!result.hard_failure);
        assert_eq!(engine.requests().len(), 1);
        assert!(h.vcs.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_without_failed_cases_skips_rerun() {
        let h = Harness::new();
        let engine = engine(vec![ScriptedStep::fail(junit(&[], &[TEST_X]))]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert!(result.outcomes.is_empty());
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_without_report_confirms_everything() {
        let h = Harness::new();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X], &[])),
            ScriptedStep::crash(),
        ]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert_eq!(result.outcomes[0].decision, Decision::ConfirmedFailure);
    }

    #[tokio::test]
    async fn test_failed_rerun_without_cases_confirms_everything() {
        let h = Harness::new();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X], &[])),
            ScriptedStep::fail("<testsuites><testsuite errors=\"1\"/></testsuites>"),
        ]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        assert_eq!(result.outcomes[0].decision, Decision::ConfirmedFailure);
        assert_eq!(
            h.ledger().confirmed_failures().unwrap(),
            vec!["pkg.TestFoo.test_x"]
        );
    }

    #[tokio::test]
    async fn test_test_missing_from_rerun_report_is_confirmed() {
        let h = Harness::new();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X, TEST_Y], &[])),
            ScriptedStep::pass(junit(&[], &[TEST_Y])),
        ]);
        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert!(result.failed);
        let decisions: Vec<_> = result
            .outcomes
            .iter()
            .map(|o| (o.test_id.as_str(), o.decision))
            .collect();
        assert_eq!(
            decisions,
            vec![
                ("pkg.TestFoo.test_x", Decision::ConfirmedFailure),
                ("pkg.TestFoo.test_y", Decision::FlakyRecovered),
            ]
        );
    }

    /// Recordings committed below `src/cli` while the report names `pkg/...`
    fn nested_harness() -> (Harness, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let x = dir.path().join("src/cli/pkg/recordings/test_x.yaml");
        let y = dir.path().join("src/cli/pkg/recordings/test_y.yaml");
        let vcs = Arc::new(
            FakeVcs::new()
                .with_committed(&x, "recorded: x\n")
                .with_committed(&y, "recorded: y\n"),
        );
        (Harness { dir, vcs }, x, y)
    }

    #[tokio::test]
    async fn test_recordings_below_a_subdirectory_are_published_and_restored() {
        let (h, x, y) = nested_harness();
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X, TEST_Y], &[])),
            ScriptedStep::fail(junit(&[TEST_Y], &[TEST_X]))
                .writing(&x, "recorded: fresh x\n")
                .writing(&y, "recorded: broken y\n"),
        ]);

        let result = h.coordinator(&engine, true).process(&h.batch()).await.unwrap();

        assert_eq!(result.outcomes[0].decision, Decision::FlakyRecovered);
        assert!(result.outcomes[0].fixture_changed);
        assert_eq!(result.outcomes[1].decision, Decision::ConfirmedFailure);
        assert_eq!(fs::read_to_string(&y).unwrap(), "recorded: y\n");

        let calls = h.vcs.calls();
        assert!(calls.contains(&format!("add {}", x.display())));
        assert!(calls.contains(&format!("restore {}", y.display())));
        assert!(!h.dir.path().join("pkg").exists());
        assert!(matches!(
            result.publish,
            Some(PublishOutcome::Published { files: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_new_recording_of_confirmed_failure_is_removed() {
        let h = Harness::new();
        let fresh = h.fixture("test_z.yaml");
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_Z], &[])),
            ScriptedStep::fail(junit(&[TEST_Z], &[])).writing(&fresh, "half written"),
        ]);

        h.coordinator(&engine, true).process(&h.batch()).await.unwrap();
        assert!(!fresh.exists());
        assert!(h.vcs.calls().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("pkg/recordings/test_x.yaml");
        let vcs = Arc::new(
            FakeVcs::new()
                .with_committed(&fixture, "old")
                .failing_pushes(u32::MAX),
        );
        let h = Harness { dir, vcs };
        let engine = engine(vec![
            ScriptedStep::fail(junit(&[TEST_X], &[])),
            ScriptedStep::pass(junit(&[], &[TEST_X])).writing(&fixture, "new"),
        ]);

        let err = h
            .coordinator(&engine, true)
            .process(&h.batch())
            .await
            .unwrap_err();
        assert!(err.is_instance_fatal());
    }

    #[test]
    fn test_rerun_report_path() {
        let batch = Batch {
            label: "serial".to_string(),
            modules: Vec::new(),
            mode: ExecMode::Serial,
            report_path: PathBuf::from("/out/test_results_latest_2.serial.xml"),
            extra_flags: String::new(),
            fanout: 1,
            descriptor: CommitDescriptor::default(),
        };
        assert_eq!(
            batch.rerun_report_path(),
            PathBuf::from("/out/test_results_latest_2.serial.live.xml")
        );
    }
}
