//! Module discovery
//!
//! Produces the universe of testable modules as `module id -> source path`.

mod command;
mod manifest;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::ShardResult;

pub use command::CommandDiscovery;
pub use manifest::{parse_module_map, ManifestDiscovery};

/// `module id -> source path`
pub type ModuleMap = BTreeMap<String, String>;

#[async_trait]
pub trait ModuleDiscovery: Send + Sync {
    async fn discover(&self) -> ShardResult<ModuleMap>;
}

/// Fixed universe, used when no discovery source is configured
#[derive(Clone, Debug, Default)]
pub struct StaticDiscovery {
    modules: ModuleMap,
}

impl StaticDiscovery {
    pub fn new(modules: ModuleMap) -> Self {
        Self { modules }
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(|id| (id.into(), String::new())).collect())
    }
}

#[async_trait]
impl ModuleDiscovery for StaticDiscovery {
    async fn discover(&self) -> ShardResult<ModuleMap> {
        Ok(self.modules.clone())
    }
}
