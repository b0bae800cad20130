//! Configuration
//!
//! Sections of the configuration file. Precedence is defaults, then file,
//! then `TESTSHARD_*` environment, then command-line flags.

mod env;
mod file;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::report::FixtureLayout;
use crate::vcs::RetryPolicy;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

/// What an instance runs against
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Built-in modules in one serial and one parallel batch
    #[default]
    Cli,
    /// Optional modules, each installed, run and published on its own
    Extension,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Cli => write!(f, "cli"),
            Target::Extension => write!(f, "extension"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" => Ok(Target::Cli),
            "extension" | "ext" => Ok(Target::Extension),
            other => Err(format!("unknown target: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Number of parallel CI instances
    pub instance_count: usize,
    /// Modules that must not share a process with others
    pub serial_modules: Vec<String>,
    /// Worker degree of parallel batches
    pub fanout: usize,
    /// Engine profile
    pub profile: String,
    pub target: Target,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            instance_count: 1,
            serial_modules: Vec::new(),
            fanout: 8,
            profile: "latest".to_string(),
            target: Target::Cli,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Rerun failed tests against live infrastructure
    pub live_rerun: bool,
    pub fixture_dir: String,
    pub fixture_extension: String,
    /// Reports and ledgers, relative to the working tree
    pub report_dir: PathBuf,
    /// Extra component of report file names, e.g. an interpreter version
    pub report_tag: Option<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            live_rerun: false,
            fixture_dir: "recordings".to_string(),
            fixture_extension: "yaml".to_string(),
            report_dir: PathBuf::from("test_results"),
            report_tag: None,
        }
    }
}

impl RecoveryConfig {
    pub fn fixture_layout(&self) -> FixtureLayout {
        FixtureLayout {
            dir_name: self.fixture_dir.clone(),
            extension: self.fixture_extension.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PublishConfig {
    pub remote: String,
    pub branch_prefix: String,
    pub max_retries: u32,
    pub backoff_secs: u64,
    /// CI build id; selects the base branch in extension mode
    pub build_id: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch_prefix: "regression_test".to_string(),
            max_retries: 3,
            backoff_secs: 10,
            build_id: None,
        }
    }
}

impl PublishConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: std::time::Duration::from_secs(self.backoff_secs),
        }
    }

    /// `<prefix>_<build_id>`, the branch extension runs start from
    pub fn base_branch(&self) -> Option<String> {
        self.build_id
            .as_ref()
            .map(|build| format!("{}_{}", self.branch_prefix, build))
    }
}

/// Where the module universe comes from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// YAML or JSON file mapping module ids to source paths
    pub manifest: Option<PathBuf>,
    /// Command printing such a document on stdout
    pub command: Option<Vec<String>>,
}
