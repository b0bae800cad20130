//! Failure ledgers
//!
//! Append-only text files consumed by the downstream report and mail jobs:
//! one for modules the engine could not run, one for confirmed failures.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct FailureLedger {
    dir: PathBuf,
    instance_index: usize,
}

impl FailureLedger {
    pub fn new(dir: impl Into<PathBuf>, instance_index: usize) -> Self {
        Self {
            dir: dir.into(),
            instance_index,
        }
    }

    pub fn error_modules_path(&self) -> PathBuf {
        self.dir
            .join(format!("test_results_error_modules_{}.txt", self.instance_index))
    }

    pub fn failure_tests_path(&self) -> PathBuf {
        self.dir
            .join(format!("test_results_failure_tests_{}.txt", self.instance_index))
    }

    /// Record modules whose run crashed before reporting
    pub fn record_crash(&self, modules: &[String]) -> Result<()> {
        if modules.is_empty() {
            return Ok(());
        }
        append_line(&self.error_modules_path(), &modules.join(","))
    }

    /// Record a test whose live rerun failed as well
    pub fn record_confirmed_failure(&self, test_id: &str) -> Result<()> {
        append_line(&self.failure_tests_path(), test_id)
    }

    pub fn crashed_modules(&self) -> Result<Vec<String>> {
        Ok(read_lines(&self.error_modules_path())?
            .iter()
            .flat_map(|line| line.split(','))
            .map(str::to_string)
            .collect())
    }

    pub fn confirmed_failures(&self) -> Result<Vec<String>> {
        read_lines(&self.failure_tests_path())
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    writeln!(file, "{line}")
        .with_context(|| format!("Failed to append to ledger: {}", path.display()))?;
    debug!("{} += {}", path.display(), line);
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
    Ok(content
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
