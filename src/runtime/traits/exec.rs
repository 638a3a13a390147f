// ABOUTME: Exec operations trait for container runtimes.
// ABOUTME: Runs commands inside running containers and captures output.

use super::shared_types::{ExecConfig, ExecResult};
use crate::types::ContainerId;
use async_trait::async_trait;

#[async_trait]
pub trait ExecOps: Send + Sync {
    /// Run a command to completion inside a container.
    async fn exec(
        &self,
        container: &ContainerId,
        config: &ExecConfig,
    ) -> Result<ExecResult, ExecError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("container not running: {0}")]
    ContainerNotRunning(String),

    #[error("exec failed: {0}")]
    Failed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
