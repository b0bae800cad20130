//! Manifest file discovery

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use super::{ModuleDiscovery, ModuleMap};
use crate::error::{ShardError, ShardResult};

/// Built-in and optional modules listed separately
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupedManifest {
    #[serde(rename = "mod", default)]
    modules: ModuleMap,
    #[serde(default)]
    ext: ModuleMap,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Grouped(GroupedManifest),
    Flat(ModuleMap),
}

impl Manifest {
    fn into_modules(self) -> ModuleMap {
        match self {
            Manifest::Flat(modules) => modules,
            Manifest::Grouped(GroupedManifest { mut modules, ext }) => {
                modules.extend(ext);
                modules
            }
        }
    }
}

/// Parse a module map, flat or grouped into `mod`/`ext`.
///
/// JSON is a subset of YAML, so one parser covers both.
pub fn parse_module_map(content: &str) -> ShardResult<ModuleMap> {
    let manifest: Manifest = serde_yaml::from_str(content)
        .map_err(|e| ShardError::DiscoveryFailure(format!("invalid module manifest: {e}")))?;
    Ok(manifest.into_modules())
}

/// Reads the module universe from a YAML or JSON file
#[derive(Clone, Debug)]
pub struct ManifestDiscovery {
    path: PathBuf,
}

impl ManifestDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ModuleDiscovery for ManifestDiscovery {
    async fn discover(&self) -> ShardResult<ModuleMap> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ShardError::DiscoveryFailure(format!("{}: {}", self.path.display(), e))
        })?;
        let modules = parse_module_map(&content)?;
        debug!(
            "Discovered {} module(s) from {}",
            modules.len(),
            self.path.display()
        );
        Ok(modules)
    }
}
