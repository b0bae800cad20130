//! External test engine
//!
//! The engine takes a list of targets, runs them, writes a JUnit report to the
//! requested path and exits non-zero when anything failed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::ExecMode;

/// One engine invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineRequest {
    /// Module ids, or class-qualified test ids for a live rerun
    pub targets: Vec<String>,
    pub mode: ExecMode,
    /// Bypass recordings and hit live infrastructure
    pub live: bool,
    pub profile: String,
    pub report_path: PathBuf,
    pub extra_flags: String,
    /// Worker degree for parallel batches
    pub fanout: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineExit {
    pub success: bool,
    pub code: Option<i32>,
}

#[cfg(test)]
impl EngineExit {
    pub fn success() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    pub fn failure(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Run the request; errors mean the engine could not be started at all
    async fn execute(&self, request: &EngineRequest) -> Result<EngineExit>;

    /// Make a module available before its tests run
    async fn prepare(&self, _module: &str) -> Result<bool> {
        Ok(true)
    }

    /// Undo `prepare`
    async fn cleanup(&self, _module: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Command-line shape of the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineSettings {
    pub program: String,
    pub base_args: Vec<String>,
    /// Flag selecting serial execution
    pub serial_flag: Option<String>,
    pub live_flag: String,
    pub profile_flag: Option<String>,
    pub report_flag: String,
    /// Passed inside the extra flags as `<flag> <fanout>` for parallel batches.
    /// Without it the engine picks its own worker count.
    pub fanout_flag: Option<String>,
    pub extra_flags_flag: String,
    pub extra_flags: String,
    pub rerun_extra_flags: String,
    /// Arguments run before a module in extension mode; `{module}` is substituted
    pub setup: Vec<String>,
    pub teardown: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: "azdev".to_string(),
            base_args: vec![
                "test".to_string(),
                "--no-exitfirst".to_string(),
                "--verbose".to_string(),
            ],
            serial_flag: Some("--series".to_string()),
            live_flag: "--live".to_string(),
            profile_flag: Some("--profile".to_string()),
            report_flag: "--xml-path".to_string(),
            fanout_flag: None,
            extra_flags_flag: "--pytest-args".to_string(),
            extra_flags: "-o junit_family=xunit1 --durations=10 --tb=no".to_string(),
            rerun_extra_flags: "-o junit_family=xunit1".to_string(),
            setup: vec![
                "extension".to_string(),
                "add".to_string(),
                "{module}".to_string(),
            ],
            teardown: vec![
                "extension".to_string(),
                "remove".to_string(),
                "{module}".to_string(),
            ],
        }
    }
}

impl EngineSettings {
    /// Full argument vector for a request, program excluded
    pub fn build_args(&self, request: &EngineRequest) -> Vec<String> {
        let mut args = self.base_args.clone();

        if request.mode == ExecMode::Serial {
            if let Some(flag) = &self.serial_flag {
                args.push(flag.clone());
            }
        }
        args.extend(request.targets.iter().cloned());

        if let Some(flag) = &self.profile_flag {
            args.push(flag.clone());
            args.push(request.profile.clone());
        }
        args.push(self.report_flag.clone());
        args.push(request.report_path.to_string_lossy().into_owned());

        if request.live {
            args.push(self.live_flag.clone());
        }

        let mut extra = request.extra_flags.clone();
        if request.mode == ExecMode::Parallel {
            if let Some(flag) = &self.fanout_flag {
                extra = format!("{extra} {flag} {}", request.fanout).trim().to_string();
            }
        }
        if !extra.is_empty() {
            args.push(self.extra_flags_flag.clone());
            args.push(extra);
        }
        args
    }

    /// Whether a configured fanout would be dropped for lack of a flag
    pub fn ignores_fanout(&self, fanout: usize) -> bool {
        fanout != 1 && self.fanout_flag.is_none()
    }

    fn hook_args(template: &[String], module: &str) -> Vec<String> {
        template
            .iter()
            .map(|arg| arg.replace("{module}", module))
            .collect()
    }
}

/// Engine invoked as an external program
#[derive(Clone, Debug)]
pub struct CommandEngine {
    settings: EngineSettings,
    workdir: PathBuf,
}

impl CommandEngine {
    pub fn new(settings: EngineSettings, workdir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            workdir: workdir.into(),
        }
    }

    async fn run_hook(&self, template: &[String], module: &str) -> Result<bool> {
        if template.is_empty() {
            return Ok(true);
        }
        let args = EngineSettings::hook_args(template, module);
        info!("{} {}", self.settings.program, args.join(" "));
        let status = Command::new(&self.settings.program)
            .args(&args)
            .current_dir(&self.workdir)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.settings.program))?;
        Ok(status.success())
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[async_trait]
impl TestEngine for CommandEngine {
    async fn execute(&self, request: &EngineRequest) -> Result<EngineExit> {
        let args = self.settings.build_args(request);
        info!("{} {}", self.settings.program, args.join(" "));

        let status = Command::new(&self.settings.program)
            .args(&args)
            .current_dir(self.workdir())
            .status()
            .await
            .with_context(|| format!("Failed to start test engine {}", self.settings.program))?;

        debug!("Engine exited with {:?}", status.code());
        Ok(EngineExit {
            success: status.success(),
            code: status.code(),
        })
    }

    async fn prepare(&self, module: &str) -> Result<bool> {
        let ok = self.run_hook(&self.settings.setup, module).await?;
        if !ok {
            warn!("Setup for {} failed", module);
        }
        Ok(ok)
    }

    async fn cleanup(&self, module: &str) -> Result<bool> {
        let ok = self.run_hook(&self.settings.teardown, module).await?;
        if !ok {
            warn!("Teardown for {} failed", module);
        }
        Ok(ok)
    }
}
