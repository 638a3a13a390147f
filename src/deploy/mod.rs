// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports state types, the Deployment struct, and DeploymentOrchestrator.

mod deployment;
mod error;
mod orchestrator;
mod state;
mod transitions;

pub use deployment::Deployment;
pub use error::{DeployError, DeployFailure};
pub use orchestrator::DeploymentOrchestrator;
pub use state::{
    BackupTaken, Completed, DeployPhase, ImagePulled, Initialized, OldSlotCleaned, Phase,
    SlotHealthy, SlotStarting, TrafficSwitched,
};
pub use transitions::{SwitchError, TransitionResult};

use crate::backup::BackupRecord;
use crate::diagnostics::Warning;
use crate::types::{ContainerId, ImageRef, SlotColor};
use serde::Serialize;

/// A completed deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    /// Slot now serving production.
    pub color: SlotColor,
    /// Slot that served production before, if any.
    pub previous: Option<SlotColor>,
    pub image: ImageRef,
    pub container: ContainerId,
    /// Pre-deploy data backup, when one was taken.
    pub backup: Option<BackupRecord>,
    pub warnings: Vec<Warning>,
}
