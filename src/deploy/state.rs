// ABOUTME: Deployment state types for the type state pattern, plus their runtime mirror.
// ABOUTME: States carry the data that exists at that point, e.g. the new container id.

use crate::backup::BackupRecord;
use crate::types::ContainerId;
use serde::Serialize;
use std::fmt;

/// Target resolved, nothing touched yet.
/// Available actions: `backup_current()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Pre-deploy snapshot attempted (best effort).
/// Available actions: `pull()`
#[derive(Debug, Clone, Default)]
pub struct BackupTaken {
    pub(crate) backup: Option<BackupRecord>,
}

/// Image available on the host.
/// Available actions: `start_new()`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePulled;

/// New slot running on the temporary port.
/// Available actions: `validate_new()`, `discard()`
#[derive(Debug, Clone)]
pub struct SlotStarting {
    pub(crate) container: ContainerId,
}

/// New slot passed both checks on the temporary port.
/// Available actions: `switch_traffic()`, `discard()`
#[derive(Debug, Clone)]
pub struct SlotHealthy {
    pub(crate) container: ContainerId,
}

/// New slot owns the production port and passed both checks there.
/// Available actions: `cleanup_old()`
#[derive(Debug, Clone)]
pub struct TrafficSwitched {
    pub(crate) container: ContainerId,
}

/// Superseded slot removed (or removal attempted).
/// Available actions: `complete()`
#[derive(Debug, Clone)]
pub struct OldSlotCleaned {
    pub(crate) container: ContainerId,
}

/// Terminal success.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) container: ContainerId,
}

macro_rules! container_state {
    ($($state:ty),*) => {
        $(impl $state {
            pub fn container_id(&self) -> &ContainerId {
                &self.container
            }
        })*
    };
}

container_state!(SlotStarting, SlotHealthy, TrafficSwitched, OldSlotCleaned, Completed);

/// Where a deployment stands, for logs and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Init,
    BackupTaken,
    ImagePulled,
    NewSlotStarting,
    NewSlotHealthy,
    TrafficSwitched,
    OldSlotCleaned,
    Complete,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployPhase::Init => "init",
            DeployPhase::BackupTaken => "backup taken",
            DeployPhase::ImagePulled => "image pulled",
            DeployPhase::NewSlotStarting => "new slot starting",
            DeployPhase::NewSlotHealthy => "new slot healthy",
            DeployPhase::TrafficSwitched => "traffic switched",
            DeployPhase::OldSlotCleaned => "old slot cleaned",
            DeployPhase::Complete => "complete",
        })
    }
}

/// Maps each state type to its phase.
pub trait Phase {
    const PHASE: DeployPhase;
}

macro_rules! phase {
    ($($state:ty => $phase:ident),*) => {
        $(impl Phase for $state {
            const PHASE: DeployPhase = DeployPhase::$phase;
        })*
    };
}

phase!(
    Initialized => Init,
    BackupTaken => BackupTaken,
    ImagePulled => ImagePulled,
    SlotStarting => NewSlotStarting,
    SlotHealthy => NewSlotHealthy,
    TrafficSwitched => TrafficSwitched,
    OldSlotCleaned => OldSlotCleaned,
    Completed => Complete
);
