//! On-disk configuration
//!
//! Lookup across the standard locations, YAML/JSON round trips and
//! validation of the values the scheduler relies on.

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{DiscoveryConfig, PublishConfig, RecoveryConfig, SchedulingConfig, Target};
use crate::error::{ShardError, ShardResult};
use crate::executor::EngineSettings;
use crate::schedule::CostTable;

/// Searched in order, first hit wins
const CONFIG_LOCATIONS: &[&str] = &[
    "./testshard.yaml",
    "./testshard.yml",
    "./.testshard.yaml",
    "./.testshard/config.yaml",
    "~/.config/testshard/config.yaml",
    "~/.testshard.yaml",
];

const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

const MAX_RETRIES_LIMIT: u32 = 10;

/// Root of `testshard.yaml`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigFile {
    /// Format version, see `SUPPORTED_VERSIONS`
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Historical duration per module, in minutes
    #[serde(default)]
    pub costs: CostTable,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            scheduling: SchedulingConfig::default(),
            costs: CostTable::new(),
            engine: EngineSettings::default(),
            recovery: RecoveryConfig::default(),
            publish: PublishConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl ConfigFile {
    /// First existing file among `CONFIG_LOCATIONS`
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load from `path`, or from the first standard location, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::find() {
                Some(found) => Self::load(&found),
                None => Ok(Self::default()),
            },
        }
    }

    /// Read, parse and validate `path`; the extension picks YAML or JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config = Format::of(path)
            .parse(&raw)
            .with_context(|| format!("Cannot parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let rendered = Format::of(path).render(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        std::fs::write(path, rendered).with_context(|| format!("Cannot write {}", path.display()))
    }

    pub fn validate(&self) -> ShardResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(ShardError::Config(format!(
                "Unsupported config version: {}",
                self.version
            )));
        }
        if self.scheduling.instance_count == 0 {
            return Err(ShardError::Config(
                "scheduling.instance_count must be at least 1".to_string(),
            ));
        }
        if self.scheduling.fanout == 0 {
            return Err(ShardError::Config(
                "scheduling.fanout must be at least 1".to_string(),
            ));
        }
        if let Some((module, _)) = self.costs.iter().find(|(_, cost)| **cost == 0) {
            return Err(ShardError::Config(format!(
                "cost of module '{module}' must be positive"
            )));
        }
        if self.publish.max_retries > MAX_RETRIES_LIMIT {
            return Err(ShardError::Config(format!(
                "publish.max_retries must not exceed {MAX_RETRIES_LIMIT}"
            )));
        }
        if self.engine.program.trim().is_empty() {
            return Err(ShardError::Config("engine.program is empty".to_string()));
        }
        Ok(())
    }

    /// Written by `testshard config init`
    pub fn example() -> Self {
        let costs = [("vm", 42), ("network", 35), ("storage", 18), ("acr", 6), ("keyvault", 4)]
            .into_iter()
            .map(|(module, minutes)| (module.to_string(), minutes))
            .collect();

        Self {
            version: default_version(),
            scheduling: SchedulingConfig {
                instance_count: 4,
                serial_modules: vec!["appservice".to_string(), "botservice".to_string()],
                fanout: 8,
                profile: "latest".to_string(),
                target: Target::Cli,
            },
            costs,
            engine: EngineSettings::default(),
            recovery: RecoveryConfig {
                live_rerun: true,
                ..Default::default()
            },
            publish: PublishConfig::default(),
            discovery: DiscoveryConfig {
                manifest: Some(PathBuf::from("modules.yaml")),
                command: None,
            },
        }
    }

    /// JSON Schema of the file format
    pub fn schema() -> Result<String> {
        let schema = schemars::schema_for!(ConfigFile);
        serde_json::to_string_pretty(&schema).context("Failed to serialize schema")
    }
}

/// `~/` prefixed locations resolve against the home directory
fn expand_path(location: &str) -> PathBuf {
    match (location.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(location),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    /// `.yaml` and `.yml` are YAML, anything else JSON
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Format::Yaml,
            _ => Format::Json,
        }
    }

    fn parse(self, raw: &str) -> Result<ConfigFile> {
        Ok(match self {
            Format::Yaml => serde_yaml::from_str(raw)?,
            Format::Json => serde_json::from_str(raw)?,
        })
    }

    fn render(self, config: &ConfigFile) -> Result<String> {
        Ok(match self {
            Format::Yaml => serde_yaml::to_string(config)?,
            Format::Json => serde_json::to_string_pretty(config)?,
        })
    }
}
