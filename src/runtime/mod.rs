// ABOUTME: Container runtime access: capability traits, detection, and the bollard client.
// ABOUTME: Docker and Podman are both driven through the Docker-compatible API.

mod client;
mod detection;
mod error;
mod traits;
mod types;

pub use client::{BollardRuntime, connect_local, connect_via_session};
pub use detection::{DetectionError, detect_runtime};
pub use error::RuntimeError;
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};

/// Everything the deploy and rollback logic needs from a runtime.
pub trait Runtime: ContainerOps + ImageOps + ExecOps + LogOps + StatsOps {}

impl<T> Runtime for T where T: ContainerOps + ImageOps + ExecOps + LogOps + StatsOps {}
