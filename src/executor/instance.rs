//! Running one instance's share of the work
//!
//! The `cli` target runs the assignment as one serial and one parallel
//! batch. The `extension` target runs each module on its own between its
//! setup and teardown hooks and publishes on a per-module branch.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Target;
use crate::error::ShardResult;
use crate::models::{BatchResult, ExecMode, InstanceReport, WorkerAssignment};
use crate::recovery::{Batch, RecoveryCoordinator};
use crate::schedule::BatchClassifier;
use crate::vcs::{CommitDescriptor, VersionControl};

/// `test_results_[<tag>_]<profile>_<instance>.<mode>.xml`
pub fn report_file_name(
    tag: Option<&str>,
    profile: &str,
    instance_index: usize,
    mode: ExecMode,
) -> String {
    match tag {
        Some(tag) => format!("test_results_{tag}_{profile}_{instance_index}.{mode}.xml"),
        None => format!("test_results_{profile}_{instance_index}.{mode}.xml"),
    }
}

#[derive(Clone, Debug)]
pub struct InstanceSettings {
    /// One-based
    pub instance_index: usize,
    pub instance_count: usize,
    pub profile: String,
    pub target: Target,
    pub fanout: usize,
    pub report_dir: PathBuf,
    pub report_tag: Option<String>,
    pub extra_flags: String,
    /// Checked out before every extension module
    pub base_branch: Option<String>,
    pub build_id: Option<String>,
}

pub struct InstanceRunner {
    coordinator: RecoveryCoordinator,
    classifier: BatchClassifier,
    vcs: Arc<dyn VersionControl>,
    settings: InstanceSettings,
}

impl InstanceRunner {
    pub fn new(
        coordinator: RecoveryCoordinator,
        classifier: BatchClassifier,
        vcs: Arc<dyn VersionControl>,
        settings: InstanceSettings,
    ) -> Self {
        Self {
            coordinator,
            classifier,
            vcs,
            settings,
        }
    }

    /// Run the assignment; only instance-fatal errors are returned
    pub async fn run(&self, assignment: &WorkerAssignment) -> ShardResult<InstanceReport> {
        let mut report = InstanceReport::new(
            self.settings.instance_index,
            self.settings.instance_count,
            &self.settings.profile,
        );

        if assignment.is_empty() {
            info!(
                "Instance {}/{} has no modules assigned",
                self.settings.instance_index, self.settings.instance_count
            );
            return Ok(report);
        }
        info!(
            "Instance {}/{}: {} module(s), {}m estimated, target {}",
            self.settings.instance_index,
            self.settings.instance_count,
            assignment.jobs().len(),
            assignment.total_cost(),
            self.settings.target
        );
        debug!("Assigned: {}", assignment.module_ids().join(", "));

        match self.settings.target {
            Target::Cli => self.run_cli(assignment, &mut report).await?,
            Target::Extension => self.run_extensions(assignment, &mut report).await?,
        }

        info!(
            "Instance {} finished: {} recovered, {} confirmed failure(s), {} crashed module(s)",
            report.instance_index,
            report.recovered_tests().len(),
            report.confirmed_failures().len(),
            report.crashed_modules().len()
        );
        Ok(report)
    }

    async fn run_cli(
        &self,
        assignment: &WorkerAssignment,
        report: &mut InstanceReport,
    ) -> ShardResult<()> {
        let plan = self.classifier.classify(assignment);
        if plan.is_empty() {
            return Ok(());
        }

        for (mode, modules) in [
            (ExecMode::Serial, plan.serial_modules()),
            (ExecMode::Parallel, plan.parallel_modules()),
        ] {
            if modules.is_empty() {
                continue;
            }
            let batch = self.cli_batch(mode, modules);
            let result = settle(&batch, self.coordinator.process(&batch).await)?;
            info!("{}", result);
            report.push(result);
        }
        Ok(())
    }

    fn cli_batch(&self, mode: ExecMode, modules: Vec<String>) -> Batch {
        let file_name = report_file_name(
            self.settings.report_tag.as_deref(),
            &self.settings.profile,
            self.settings.instance_index,
            mode,
        );
        Batch {
            label: mode.to_string(),
            modules,
            mode,
            report_path: self.settings.report_dir.join(&file_name),
            extra_flags: self.settings.extra_flags.clone(),
            fanout: match mode {
                ExecMode::Serial => 1,
                ExecMode::Parallel => self.settings.fanout,
            },
            descriptor: CommitDescriptor::new(self.settings.instance_index, file_name),
        }
    }

    async fn run_extensions(
        &self,
        assignment: &WorkerAssignment,
        report: &mut InstanceReport,
    ) -> ShardResult<()> {
        for job in assignment.jobs() {
            let result = self.run_extension(&job.module_id).await;
            if let Err(e) = self.coordinator.runner().engine().cleanup(&job.module_id).await {
                warn!("Teardown of {} failed: {:#}", job.module_id, e);
            }
            let result = result?;
            info!("{}", result);
            report.push(result);
        }
        Ok(())
    }

    async fn run_extension(&self, module: &str) -> ShardResult<BatchResult> {
        if let Some(base) = &self.settings.base_branch {
            if let Err(e) = self.vcs.checkout(base).await {
                warn!("Could not check out {}: {}", base, e);
            }
        }

        let prepared = match self.coordinator.runner().engine().prepare(module).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Setup of {} could not run: {:#}", module, e);
                false
            }
        };
        if !prepared {
            warn!("Skipping tests of {}", module);
            let mut result = BatchResult::new(module, ExecMode::Parallel, vec![module.to_string()]);
            result.failed = true;
            result.hard_failure = true;
            if let Err(e) = self.coordinator.ledger().record_crash(&result.modules) {
                warn!("Could not record crashed modules: {:#}", e);
            }
            return Ok(result);
        }

        let file_name = format!("test_results_{module}.xml");
        let batch = Batch {
            label: module.to_string(),
            modules: vec![module.to_string()],
            mode: ExecMode::Parallel,
            report_path: self.settings.report_dir.join(&file_name),
            extra_flags: self.settings.extra_flags.clone(),
            fanout: self.settings.fanout,
            descriptor: CommitDescriptor::new(self.settings.instance_index, file_name)
                .with_modules(vec![module.to_string()])
                .with_build_id(self.settings.build_id.clone()),
        };
        settle(&batch, self.coordinator.process(&batch).await)
    }
}

/// Turn a non-fatal batch error into a failed result so the instance continues
fn settle(batch: &Batch, result: ShardResult<BatchResult>) -> ShardResult<BatchResult> {
    match result {
        Err(e) if !e.is_instance_fatal() => {
            error!("Batch {} aborted: {}", batch.label, e);
            let mut failed = BatchResult::new(&batch.label, batch.mode, batch.modules.clone());
            failed.failed = true;
            Ok(failed)
        }
        other => other,
    }
}
