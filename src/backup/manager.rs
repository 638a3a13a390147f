// ABOUTME: BackupManager: create, verify, list, prune and restore point-in-time backups.
// ABOUTME: Container-sourced kinds read from the active slot; the rest from host storage.

use super::BackupError;
use super::record::{BackupKind, BackupRecord, numbered_file_name};
use super::retention::newest_first;
use super::store::{BackupSource, BackupStore};
use crate::config::Settings;
use crate::runtime::{ContainerOps, RuntimeType};
use crate::slot::{Slot, SlotResolver, StateError};
use chrono::{SubsecRound, Utc};
use std::collections::HashSet;

pub struct BackupManager<'a, R: ContainerOps + ?Sized, B: BackupStore + ?Sized> {
    runtime: &'a R,
    store: &'a B,
    settings: &'a Settings,
    runtime_type: RuntimeType,
}

impl<'a, R: ContainerOps + ?Sized, B: BackupStore + ?Sized> BackupManager<'a, R, B> {
    pub fn new(runtime: &'a R, store: &'a B, settings: &'a Settings, runtime_type: RuntimeType) -> Self {
        Self {
            runtime,
            store,
            settings,
            runtime_type,
        }
    }

    fn kind_dir(&self, kind: BackupKind) -> String {
        format!("{}/{}", self.settings.backup.directory.trim_end_matches('/'), kind)
    }

    /// The running slot, if exactly one is running.
    async fn active_slot(&self) -> Result<Option<Slot>, BackupError> {
        let resolver = SlotResolver::new(self.runtime, &self.settings.slots.name);
        match resolver.resolve_active().await {
            Ok((active, _)) => Ok(resolver.describe(active).await?),
            Err(StateError::NoActiveSlot(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn source_for(&self, kind: BackupKind, active: Option<&Slot>) -> Result<BackupSource, BackupError> {
        let backup = &self.settings.backup;
        let not_configured = |reason: &str| BackupError::NotConfigured {
            kind,
            reason: reason.to_string(),
        };
        let running = active.filter(|s| s.is_running());

        match kind {
            BackupKind::Data => match (running, &backup.container_data_dir, &backup.data_dir) {
                (Some(slot), Some(path), _) => Ok(BackupSource::ContainerDir {
                    runtime: self.runtime_type,
                    container: slot.container.to_string(),
                    path: path.clone(),
                }),
                (_, _, Some(dir)) => Ok(BackupSource::HostDir(dir.clone())),
                (None, Some(_), None) => Err(not_configured(
                    "no running slot to copy container_data_dir from and no data_dir set",
                )),
                (_, None, None) => Err(not_configured("set backup.data_dir or backup.container_data_dir")),
            },
            BackupKind::Database => {
                let command = backup
                    .database_command
                    .as_ref()
                    .ok_or_else(|| not_configured("set backup.database_command"))?;
                let slot = running.ok_or_else(|| not_configured("database dumps need a running slot"))?;
                Ok(BackupSource::ContainerCommand {
                    runtime: self.runtime_type,
                    container: slot.container.to_string(),
                    command: command.clone(),
                })
            }
            BackupKind::Config => backup
                .config_dir
                .clone()
                .map(BackupSource::HostDir)
                .ok_or_else(|| not_configured("set backup.config_dir")),
            BackupKind::Image => {
                let image = active
                    .and_then(|s| s.image.as_ref())
                    .ok_or_else(|| not_configured("no slot image to save"))?;
                Ok(BackupSource::Image {
                    runtime: self.runtime_type,
                    image: image.to_string(),
                })
            }
            BackupKind::Full => {
                let dirs: Vec<String> = [&backup.data_dir, &backup.config_dir]
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect();
                if dirs.is_empty() {
                    Err(not_configured("set backup.data_dir or backup.config_dir"))
                } else {
                    Ok(BackupSource::HostDirs(dirs))
                }
            }
        }
    }

    /// Write and verify a new backup. An archive that fails verification is
    /// deleted and reported as an integrity error.
    pub async fn create(&self, kind: BackupKind) -> Result<BackupRecord, BackupError> {
        let active = self.active_slot().await?;
        let source = self.source_for(kind, active.as_ref())?;
        // Seconds only, as stored in the file name.
        let created_at = Utc::now().trunc_subsecs(0);
        let dir = self.kind_dir(kind);
        let taken: HashSet<String> = self.store.list(&dir).await?.into_iter().map(|f| f.name).collect();
        let name = (1..=u32::MAX)
            .map(|n| numbered_file_name(kind, created_at, n))
            .find(|name| !taken.contains(name))
            .ok_or_else(|| BackupError::Listing {
                dir: dir.clone(),
                reason: "no free backup file name".to_string(),
            })?;
        let path = format!("{}/{}", dir, name);

        self.store.archive(&source, &path).await?;
        let verified = self.store.verify(&path, kind.is_tar()).await?;
        if !verified {
            tracing::warn!("backup {} failed verification, removing it", path);
            if let Err(e) = self.store.remove(&path).await {
                tracing::warn!("could not remove unverified backup {}: {}", path, e);
            }
            return Err(BackupError::Integrity { path });
        }
        let size = self.store.size(&path).await?;
        tracing::info!(%kind, %path, size, "backup created");
        Ok(BackupRecord {
            kind,
            path,
            created_at,
            size,
            verified,
        })
    }

    /// Re-run the integrity check on an existing record.
    pub async fn verify(&self, record: &BackupRecord) -> Result<BackupRecord, BackupError> {
        let verified = self.store.verify(&record.path, record.kind.is_tar()).await?;
        Ok(BackupRecord {
            verified,
            ..record.clone()
        })
    }

    /// Records of `kind`, newest first. Not verified.
    pub async fn list(&self, kind: BackupKind) -> Result<Vec<BackupRecord>, BackupError> {
        let dir = self.kind_dir(kind);
        let mut records: Vec<BackupRecord> = self
            .store
            .list(&dir)
            .await?
            .into_iter()
            .filter_map(|f| BackupRecord::from_listing(&dir, &f.name, f.size))
            .filter(|r| r.kind == kind)
            .collect();
        records.sort_by(newest_first);
        Ok(records)
    }

    pub async fn latest(&self, kind: BackupKind) -> Result<Option<BackupRecord>, BackupError> {
        Ok(self.list(kind).await?.into_iter().next())
    }

    /// Apply the retention policy across all kinds. Returns what was removed.
    pub async fn prune(&self) -> Result<Vec<BackupRecord>, BackupError> {
        let mut all = Vec::new();
        for kind in BackupKind::ALL {
            all.extend(self.list(kind).await?);
        }
        let doomed: Vec<BackupRecord> = self
            .settings
            .backup
            .retention
            .plan(&all, Utc::now())
            .into_iter()
            .cloned()
            .collect();
        for record in &doomed {
            self.store.remove(&record.path).await?;
            tracing::info!(path = %record.path, "pruned backup");
        }
        Ok(doomed)
    }

    /// Restore a data backup into `backup.data_dir`, verifying it first.
    pub async fn restore(&self, record: &BackupRecord) -> Result<(), BackupError> {
        if record.kind != BackupKind::Data {
            return Err(BackupError::NotConfigured {
                kind: record.kind,
                reason: "only data backups can be restored".to_string(),
            });
        }
        let data_dir = self
            .settings
            .backup
            .data_dir
            .as_ref()
            .ok_or_else(|| BackupError::NotConfigured {
                kind: BackupKind::Data,
                reason: "set backup.data_dir to restore into".to_string(),
            })?;
        if !self.verify(record).await?.verified {
            return Err(BackupError::Integrity {
                path: record.path.clone(),
            });
        }
        self.store.restore(&record.path, data_dir).await?;
        tracing::info!(path = %record.path, into = %data_dir, "backup restored");
        Ok(())
    }
}
