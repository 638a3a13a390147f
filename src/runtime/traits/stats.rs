// ABOUTME: Resource usage sampling for containers.
// ABOUTME: One CPU and memory reading per call, no streaming.

use crate::types::ContainerId;
use async_trait::async_trait;
use serde::Serialize;

#[async_trait]
pub trait StatsOps: Send + Sync {
    async fn stats(&self, id: &ContainerId) -> Result<ResourceUsage, StatsError>;
}

/// A single resource usage sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// Percent of one CPU; may exceed 100 on multi-core hosts.
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    /// Zero when the runtime reports no limit.
    pub memory_limit: u64,
}

impl ResourceUsage {
    pub fn memory_percent(&self) -> Option<f64> {
        (self.memory_limit > 0).then(|| self.memory_bytes as f64 / self.memory_limit as f64 * 100.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stats unavailable: {0}")]
    Unavailable(String),
}
