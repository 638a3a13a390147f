// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Pull images, check for local copies, and list a repository's images.

use crate::types::{ImageId, ImageRef};
use async_trait::async_trait;

#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Pull an image from its registry.
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Check if an image exists locally.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;

    /// Local images whose tags belong to `repository` (e.g. `ghcr.io/org/app`).
    async fn list_images(&self, repository: &str) -> Result<Vec<ImageSummary>, ImageError>;
}

/// A local image.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub id: ImageId,
    /// `repository:tag` references pointing at this image.
    pub tags: Vec<String>,
    /// Creation time, seconds since the epoch.
    pub created: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
