//! Test execution runner
//!
//! Invokes the engine for one batch and classifies the result. A non-zero
//! exit is reported, not raised; a failed run without a report means the
//! modules could not be executed at all.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::engine::{EngineRequest, TestEngine};
use crate::utils::Timer;

/// What one engine invocation produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub failed: bool,
    pub report_path: PathBuf,
    pub report_present: bool,
    pub duration_ms: u64,
}

impl RunOutcome {
    /// Failed without writing a report
    pub fn hard_failure(&self) -> bool {
        self.failed && !self.report_present
    }
}

/// Runs batches through a test engine
#[derive(Clone)]
pub struct TestRunner {
    engine: Arc<dyn TestEngine>,
}

impl TestRunner {
    pub fn new(engine: Arc<dyn TestEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn TestEngine> {
        &self.engine
    }

    pub async fn run(&self, request: &EngineRequest) -> RunOutcome {
        let report_path = request.report_path.clone();

        // a stale report must not pass for this run's output
        if report_path.exists() {
            if let Err(e) = std::fs::remove_file(&report_path) {
                warn!("Could not remove stale report {}: {}", report_path.display(), e);
            }
        }
        if let Some(parent) = report_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Could not create report directory {}: {}", parent.display(), e);
            }
        }

        info!(
            "Running {} target(s) in {} mode{}",
            request.targets.len(),
            request.mode,
            if request.live { " (live)" } else { "" }
        );

        let timer = Timer::start(format!("{} batch", request.mode));
        let failed = match self.engine.execute(request).await {
            Ok(exit) => !exit.success,
            Err(e) => {
                error!("Test engine could not run: {:#}", e);
                true
            }
        };
        let duration_ms = timer.stop().as_millis() as u64;
        let report_present = report_path.is_file();

        let outcome = RunOutcome {
            failed,
            report_path,
            report_present,
            duration_ms,
        };

        if outcome.hard_failure() {
            warn!(
                "Engine failed without a report for {}",
                request.targets.join(", ")
            );
        } else {
            info!(
                "Batch {} in {}ms",
                if failed { "failed" } else { "passed" },
                duration_ms
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecMode;
    use crate::testing::{ScriptedEngine, ScriptedStep};
    use std::fs;
    use tempfile::tempdir;

    fn request(report_path: PathBuf) -> EngineRequest {
        EngineRequest {
            targets: vec!["acr".to_string()],
            mode: ExecMode::Parallel,
            live: false,
            profile: "latest".to_string(),
            report_path,
            extra_flags: String::new(),
            fanout: 4,
        }
    }

    #[tokio::test]
    async fn test_passing_run() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptedStep::pass("<testsuites/>")]));
        let outcome = TestRunner::new(engine)
            .run(&request(dir.path().join("r.xml")))
            .await;
        assert!(!outcome.failed);
        assert!(outcome.report_present);
        assert!(!outcome.hard_failure());
    }

    #[tokio::test]
    async fn test_failed_run_with_report_is_not_hard_failure() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptedStep::fail("<testsuites/>")]));
        let outcome = TestRunner::new(engine)
            .run(&request(dir.path().join("r.xml")))
            .await;
        assert!(outcome.failed);
        assert!(!outcome.hard_failure());
    }

    #[tokio::test]
    async fn test_crash_without_report_is_hard_failure() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("out").join("r.xml");
        fs::create_dir_all(report.parent().unwrap()).unwrap();
        fs::write(&report, "<testsuites/>").unwrap();

        let engine = Arc::new(ScriptedEngine::new(vec![ScriptedStep::crash()]));
        let outcome = TestRunner::new(engine).run(&request(report.clone())).await;
        assert!(outcome.hard_failure());
        assert!(!report.exists(), "stale report must be removed");
    }

    #[tokio::test]
    async fn test_engine_start_error_is_hard_failure() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptedStep::unavailable()]));
        let outcome = TestRunner::new(engine)
            .run(&request(dir.path().join("r.xml")))
            .await;
        assert!(outcome.failed);
        assert!(outcome.hard_failure());
    }
}
