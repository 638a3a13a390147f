// ABOUTME: Log operations trait for container runtimes.
// ABOUTME: Fetches the tail of a container's combined output.

use crate::types::ContainerId;
use async_trait::async_trait;

#[async_trait]
pub trait LogOps: Send + Sync {
    /// The last `lines` lines of stdout and stderr, oldest first.
    async fn tail_logs(&self, id: &ContainerId, lines: u64) -> Result<Vec<LogLine>, LogError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub content: String,
    pub stream: LogStream,
}

impl LogLine {
    pub fn stdout(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stream: LogStream::Stdout,
        }
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stream: LogStream::Stderr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),
}
