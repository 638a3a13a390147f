// ABOUTME: Error types for deployment operations.
// ABOUTME: Step errors, and DeployFailure recording where the state machine stopped.

use super::state::DeployPhase;
use crate::error::ErrorKind;
use crate::health::HealthTimeout;
use crate::runtime::{ContainerError, ImageError};
use crate::slot::StateError;
use crate::types::SlotColor;
use std::fmt;

/// Errors that can occur during deployment state transitions.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to pull image: {0}")]
    ImagePull(#[from] ImageError),

    #[error("failed to start {color} slot: {source}")]
    Start {
        color: SlotColor,
        source: ContainerError,
    },

    #[error("failed to stop active {color} slot: {source}")]
    StopActive {
        color: SlotColor,
        source: ContainerError,
    },

    #[error(transparent)]
    Health(#[from] HealthTimeout),
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::State(StateError::Runtime(_)) => ErrorKind::Connectivity,
            DeployError::State(_) => ErrorKind::State,
            DeployError::Health(_) => ErrorKind::HealthTimeout,
            DeployError::ImagePull(_) | DeployError::Start { .. } | DeployError::StopActive { .. } => {
                ErrorKind::Step
            }
        }
    }
}

/// A deployment that reached `Failed`.
#[derive(Debug)]
pub struct DeployFailure {
    /// Last state reached before the failure.
    pub phase: DeployPhase,
    pub error: DeployError,
    /// The active slot was stopped and nothing healthy holds the production
    /// port. Run `slotctl rollback`.
    pub production_unbound: bool,
    /// Key of the incident snapshot, when one was written.
    pub incident: Option<String>,
}

impl DeployFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deployment failed at {}: {}", self.phase, self.error)?;
        if self.production_unbound {
            f.write_str(" (production port has no healthy slot; run `slotctl rollback`)")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeployFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
