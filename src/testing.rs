//! Scripted collaborators for unit tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::executor::{EngineExit, EngineRequest, TestEngine};
use crate::vcs::{VcsError, VersionControl};

/// JUnit document with one failing case per `(classname, name, file)`
pub fn junit(failures: &[(&str, &str, &str)], passes: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from("<testsuites><testsuite name=\"pytest\">");
    for (classname, name, file) in passes {
        xml.push_str(&format!(
            "<testcase classname=\"{classname}\" name=\"{name}\" file=\"{file}\"/>"
        ));
    }
    for (classname, name, file) in failures {
        xml.push_str(&format!(
            "<testcase classname=\"{classname}\" name=\"{name}\" file=\"{file}\">\
             <failure message=\"boom\">trace</failure></testcase>"
        ));
    }
    xml.push_str("</testsuite></testsuites>");
    xml
}

/// One scripted engine invocation
#[derive(Clone, Debug)]
pub struct ScriptedStep {
    pub success: bool,
    pub report: Option<String>,
    /// Files the engine rewrites as a side effect
    pub writes: Vec<(PathBuf, String)>,
    pub start_error: bool,
}

impl ScriptedStep {
    pub fn pass(report: impl Into<String>) -> Self {
        Self {
            success: true,
            report: Some(report.into()),
            writes: Vec::new(),
            start_error: false,
        }
    }

    pub fn fail(report: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::pass(report)
        }
    }

    pub fn crash() -> Self {
        Self {
            success: false,
            report: None,
            writes: Vec::new(),
            start_error: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            start_error: true,
            ..Self::crash()
        }
    }

    pub fn writing(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.writes.push((path.into(), content.into()));
        self
    }
}

/// Engine replaying scripted steps in order
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<EngineRequest>>,
    failing_setup: Vec<String>,
    hooks: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            failing_setup: Vec::new(),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_setup_for(mut self, module: &str) -> Self {
        self.failing_setup.push(module.to_string());
        self
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hooks(&self) -> Vec<String> {
        self.hooks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestEngine for ScriptedEngine {
    async fn execute(&self, request: &EngineRequest) -> Result<EngineExit> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedStep::pass("<testsuites/>"));

        if step.start_error {
            bail!("engine not installed");
        }
        for (path, content) in &step.writes {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }
        if let Some(report) = &step.report {
            fs::write(&request.report_path, report)?;
        }
        Ok(if step.success {
            EngineExit::success()
        } else {
            EngineExit::failure(1)
        })
    }

    async fn prepare(&self, module: &str) -> Result<bool> {
        self.hooks.lock().unwrap().push(format!("prepare {module}"));
        Ok(!self.failing_setup.iter().any(|m| m == module))
    }

    async fn cleanup(&self, module: &str) -> Result<bool> {
        self.hooks.lock().unwrap().push(format!("cleanup {module}"));
        Ok(true)
    }
}

/// In-memory version control that restores from registered baselines
pub struct FakeVcs {
    calls: Mutex<Vec<String>>,
    baselines: Mutex<HashMap<PathBuf, Vec<u8>>>,
    staged: Mutex<Vec<PathBuf>>,
    push_failures: Mutex<u32>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            baselines: Mutex::new(HashMap::new()),
            staged: Mutex::new(Vec::new()),
            push_failures: Mutex::new(0),
        }
    }

    /// Fail the next `count` pushes
    pub fn failing_pushes(self, count: u32) -> Self {
        *self.push_failures.lock().unwrap() = count;
        self
    }

    /// Register committed content for `path` and write it to disk
    pub fn with_committed(self, path: impl Into<PathBuf>, content: &str) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        self.baselines
            .lock()
            .unwrap()
            .insert(path, content.as_bytes().to_vec());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("commit ").map(str::to_string))
            .collect()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

fn failed(command: &str) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        stderr: "scripted failure".to_string(),
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn locate(&self, path: &Path) -> Result<Option<PathBuf>, VcsError> {
        Ok(self
            .baselines
            .lock()
            .unwrap()
            .keys()
            .find(|committed| committed.ends_with(path))
            .cloned())
    }

    async fn restore(&self, path: &Path) -> Result<(), VcsError> {
        self.record(format!("restore {}", path.display()));
        let content = self.baselines.lock().unwrap().get(path).cloned();
        match content {
            Some(content) => fs::write(path, content).map_err(VcsError::Spawn),
            None => Err(failed("git restore")),
        }
    }

    async fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        for path in paths {
            self.record(format!("add {}", path.display()));
        }
        self.staged.lock().unwrap().extend(paths.iter().cloned());
        Ok(())
    }

    async fn has_staged_changes(&self) -> Result<bool, VcsError> {
        Ok(!self.staged.lock().unwrap().is_empty())
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.record(format!("commit {message}"));
        self.staged.lock().unwrap().clear();
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        self.record(format!("checkout {branch}"));
        Ok(())
    }

    async fn checkout_new_branch(&self, branch: &str) -> Result<(), VcsError> {
        self.record(format!("checkout -b {branch}"));
        Ok(())
    }

    async fn fetch(&self) -> Result<(), VcsError> {
        self.record("fetch");
        Ok(())
    }

    async fn pull_rebase(&self) -> Result<(), VcsError> {
        self.record("pull --rebase");
        Ok(())
    }

    async fn abort_rebase(&self) -> Result<(), VcsError> {
        self.record("rebase --abort");
        Ok(())
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.record("push");
        let mut remaining = self.push_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(failed("git push"));
        }
        Ok(())
    }

    async fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.record(format!("push --set-upstream {remote} {branch}"));
        Ok(())
    }
}
