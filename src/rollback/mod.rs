// ABOUTME: Layered rollback: container-level first, then restore from a data backup.
// ABOUTME: Modes select which tiers run; both tiers are wrapped in incident snapshots.

mod coordinator;

pub use coordinator::RollbackCoordinator;

use crate::backup::BackupError;
use crate::error::ErrorKind;
use crate::health::HealthTimeout;
use crate::runtime::{ContainerError, ImageError};
use crate::slot::StateError;
use crate::types::{ImageRef, SlotColor};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackMode {
    /// Container tier, then backup tier if it fails.
    #[default]
    Auto,
    Container,
    Backup,
}

impl FromStr for RollbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RollbackMode::Auto),
            "container" => Ok(RollbackMode::Container),
            "backup" => Ok(RollbackMode::Backup),
            other => Err(format!(
                "unknown rollback mode {:?} (auto, container, backup)",
                other
            )),
        }
    }
}

impl fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RollbackMode::Auto => "auto",
            RollbackMode::Container => "container",
            RollbackMode::Backup => "backup",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackTier {
    Container,
    Backup,
}

impl fmt::Display for RollbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RollbackTier::Container => "container",
            RollbackTier::Backup => "backup",
        })
    }
}

/// Why one tier failed.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("no rollback target: {0}")]
    NoTarget(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("container operation failed: {0}")]
    Container(#[from] ContainerError),

    #[error("image unavailable: {0}")]
    Image(#[from] ImageError),

    #[error(transparent)]
    Health(#[from] HealthTimeout),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl TierError {
    fn kind(&self) -> ErrorKind {
        match self {
            TierError::State(StateError::Runtime(_)) => ErrorKind::Connectivity,
            TierError::State(_) => ErrorKind::State,
            TierError::Health(_) => ErrorKind::HealthTimeout,
            TierError::Backup(e) => e.kind(),
            TierError::NoTarget(_) | TierError::Container(_) | TierError::Image(_) => ErrorKind::Step,
        }
    }
}

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("{tier} rollback failed: {source}")]
    Tier {
        tier: RollbackTier,
        source: TierError,
        incident: Option<String>,
    },

    #[error("rollback exhausted: container tier failed ({container}); backup tier failed ({backup})")]
    Exhausted {
        container: TierError,
        backup: TierError,
        incidents: Vec<String>,
    },
}

impl RollbackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RollbackError::Tier { source, .. } => source.kind(),
            RollbackError::Exhausted { .. } => ErrorKind::RollbackExhausted,
        }
    }
}

/// A rollback that left a healthy slot on the production port.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub tier: RollbackTier,
    pub color: SlotColor,
    pub image: ImageRef,
    /// False when an earlier rollback was already in place and healthy.
    pub changed: bool,
    /// Snapshot keys for every tier that ran.
    pub incidents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse() {
        assert_eq!("auto".parse::<RollbackMode>().unwrap(), RollbackMode::Auto);
        assert_eq!("backup".parse::<RollbackMode>().unwrap(), RollbackMode::Backup);
        assert!("both".parse::<RollbackMode>().is_err());
    }

    #[test]
    fn exhausted_maps_to_its_own_kind() {
        let err = RollbackError::Exhausted {
            container: TierError::NoTarget("no previous image".to_string()),
            backup: TierError::NoTarget("no data backup".to_string()),
            incidents: Vec::new(),
        };
        assert_eq!(err.kind(), ErrorKind::RollbackExhausted);
        assert!(err.to_string().contains("no data backup"));
    }
}
