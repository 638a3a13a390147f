// ABOUTME: The collaborators deploy and rollback share for one environment.
// ABOUTME: Runtime, HTTP transport, state store, backup store, and resolved settings.

use crate::backup::{BackupManager, BackupStore};
use crate::config::Settings;
use crate::health::{HealthProbe, HttpTransport};
use crate::runtime::{Runtime, RuntimeType};
use crate::slot::SlotResolver;
use crate::state::StateStore;
use std::collections::HashMap;

pub struct Context<'a, R: ?Sized, H: ?Sized, S: ?Sized, B: ?Sized> {
    pub runtime: &'a R,
    pub http: &'a H,
    pub store: &'a S,
    pub backups: &'a B,
    pub settings: &'a Settings,
    pub runtime_type: RuntimeType,
    /// Environment passed to every slot container.
    pub container_env: HashMap<String, String>,
}

impl<'a, R, H, S, B> Context<'a, R, H, S, B>
where
    R: Runtime + ?Sized,
    H: HttpTransport + ?Sized,
    S: StateStore + ?Sized,
    B: BackupStore + ?Sized,
{
    pub fn resolver(&self) -> SlotResolver<'a, R> {
        SlotResolver::new(self.runtime, &self.settings.slots.name)
    }

    pub fn probe(&self) -> HealthProbe<'a, R, H> {
        HealthProbe::new(self.runtime, self.http, self.settings.health.request_timeout)
    }

    pub fn backup_manager(&self) -> BackupManager<'a, R, B> {
        BackupManager::new(self.runtime, self.backups, self.settings, self.runtime_type)
    }
}
