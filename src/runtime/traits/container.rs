// ABOUTME: Container lifecycle operations for container runtimes.
// ABOUTME: Create, start, stop, remove, inspect, and list slot containers.

use super::shared_types::{ContainerConfig, ContainerInfo, ContainerState};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// Create (but do not start) a container.
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError>;

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Stop a running container, waiting up to `timeout` before killing it.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Exact label matches (key=value).
    pub labels: HashMap<String, String>,
    pub name: Option<String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// All containers, running or not, carrying `key=value`.
    pub fn labeled(key: &str, value: &str) -> Self {
        let mut labels = HashMap::new();
        labels.insert(key.to_string(), value.to_string());
        Self {
            labels,
            name: None,
            all: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Human readable status, e.g. "Up 3 minutes (healthy)".
    pub status: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}
