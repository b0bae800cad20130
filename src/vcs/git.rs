//! Git command-line backend
//!
//! Shells out to `git` in the working tree that holds the recordings.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Version control errors
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Operations the recovery protocol needs from version control
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Working-tree file whose path ends with `path`, relative to the
    /// working directory. Tracked files and untracked, unignored ones count.
    async fn locate(&self, path: &Path) -> Result<Option<PathBuf>, VcsError>;

    /// Discard local changes to one file
    async fn restore(&self, path: &Path) -> Result<(), VcsError>;

    async fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError>;

    async fn has_staged_changes(&self) -> Result<bool, VcsError>;

    async fn commit(&self, message: &str) -> Result<(), VcsError>;

    async fn checkout(&self, branch: &str) -> Result<(), VcsError>;

    async fn checkout_new_branch(&self, branch: &str) -> Result<(), VcsError>;

    async fn fetch(&self) -> Result<(), VcsError>;

    async fn pull_rebase(&self) -> Result<(), VcsError>;

    async fn abort_rebase(&self) -> Result<(), VcsError>;

    async fn push(&self) -> Result<(), VcsError>;

    async fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<(), VcsError>;
}

/// `git` executed in a fixed working directory
#[derive(Clone, Debug)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn output(&self, args: &[String]) -> Result<Output, VcsError> {
        debug!("git {}", args.join(" "));
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await?)
    }

    async fn run(&self, args: &[String]) -> Result<String, VcsError> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether the working tree has no pending changes
    pub async fn is_clean(&self) -> Result<bool, VcsError> {
        let status = self.run(&args(["status", "--porcelain"])).await?;
        Ok(status.trim().is_empty())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Shortest entry of a NUL separated `ls-files -z` listing ending with `suffix`
fn pick_suffix_match(listing: &str, suffix: &Path) -> Option<PathBuf> {
    listing
        .split('\0')
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .filter(|entry| entry.ends_with(suffix))
        .min_by_key(|entry| (entry.components().count(), entry.clone()))
}

#[async_trait]
impl VersionControl for GitCli {
    async fn locate(&self, path: &Path) -> Result<Option<PathBuf>, VcsError> {
        if path.is_absolute() {
            return Ok(path.exists().then(|| path.to_path_buf()));
        }
        let mut cmd = args(["ls-files", "-z", "--cached", "--others", "--exclude-standard", "--"]);
        cmd.push(format!("*{}", path.to_string_lossy()));
        let listing = self.run(&cmd).await?;
        Ok(pick_suffix_match(&listing, path))
    }

    async fn restore(&self, path: &Path) -> Result<(), VcsError> {
        let mut cmd = args(["restore", "--"]);
        cmd.push(path.to_string_lossy().into_owned());
        self.run(&cmd).await.map(|_| ())
    }

    async fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        let mut cmd = args(["add", "--"]);
        cmd.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        self.run(&cmd).await.map(|_| ())
    }

    async fn has_staged_changes(&self) -> Result<bool, VcsError> {
        let output = self.output(&args(["diff", "--cached", "--quiet"])).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(VcsError::CommandFailed {
                command: "git diff --cached --quiet".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        let mut cmd = args(["commit", "-m"]);
        cmd.push(message.to_string());
        self.run(&cmd).await.map(|_| ())
    }

    async fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        let mut cmd = args(["checkout"]);
        cmd.push(branch.to_string());
        self.run(&cmd).await.map(|_| ())
    }

    async fn checkout_new_branch(&self, branch: &str) -> Result<(), VcsError> {
        let mut cmd = args(["checkout", "-b"]);
        cmd.push(branch.to_string());
        self.run(&cmd).await.map(|_| ())
    }

    async fn fetch(&self) -> Result<(), VcsError> {
        self.run(&args(["fetch"])).await.map(|_| ())
    }

    async fn pull_rebase(&self) -> Result<(), VcsError> {
        self.run(&args(["pull", "--rebase"])).await.map(|_| ())
    }

    async fn abort_rebase(&self) -> Result<(), VcsError> {
        self.run(&args(["rebase", "--abort"])).await.map(|_| ())
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.run(&args(["push"])).await.map(|_| ())
    }

    async fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        let mut cmd = args(["push", "--set-upstream"]);
        cmd.push(remote.to_string());
        cmd.push(branch.to_string());
        self.run(&cmd).await.map(|_| ())
    }
}
