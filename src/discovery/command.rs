//! Discovery through an external command printing a module manifest

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::info;

use super::{parse_module_map, ModuleDiscovery, ModuleMap};
use crate::error::{ShardError, ShardResult};

#[derive(Clone, Debug)]
pub struct CommandDiscovery {
    argv: Vec<String>,
    workdir: PathBuf,
}

impl CommandDiscovery {
    pub fn new(argv: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ModuleDiscovery for CommandDiscovery {
    async fn discover(&self) -> ShardResult<ModuleMap> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| ShardError::DiscoveryFailure("empty discovery command".to_string()))?;
        info!("Discovering modules: {}", self.argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
            .map_err(|e| ShardError::DiscoveryFailure(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            return Err(ShardError::DiscoveryFailure(format!(
                "{} exited with {:?}: {}",
                program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_module_map(&String::from_utf8_lossy(&output.stdout))
    }
}
