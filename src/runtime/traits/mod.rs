// ABOUTME: Capability traits the deploy and rollback logic needs from a runtime.
// ABOUTME: ContainerOps, ImageOps, ExecOps, LogOps and StatsOps, split by concern.

mod container;
mod exec;
mod image;
mod logs;
mod shared_types;
mod stats;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use exec::{ExecError, ExecOps};
pub use image::{ImageError, ImageOps, ImageSummary};
pub use logs::{LogError, LogLine, LogOps, LogStream};
pub use shared_types::*;
pub use stats::{ResourceUsage, StatsError, StatsOps};
