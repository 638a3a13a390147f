// ABOUTME: RollbackCoordinator runs the container tier and then the backup tier.
// ABOUTME: Each tier recreates a slot on the production port labeled as a rollback.

use super::{RollbackError, RollbackMode, RollbackOutcome, RollbackTier, TierError};
use crate::backup::{BackupKind, BackupStore};
use crate::context::Context;
use crate::health::HttpTransport;
use crate::incident;
use crate::known_good::{self, LastKnownGood};
use crate::runtime::{ContainerError, Runtime};
use crate::slot::{Slot, StateError, container_config, launch, retire};
use crate::state::StateStore;
use crate::types::{ContainerId, ImageRef, SlotColor};
use chrono::Utc;

/// What a tier leaves running when it succeeds.
struct Restored {
    color: SlotColor,
    image: ImageRef,
    changed: bool,
}

pub struct RollbackCoordinator<'c, 'a, R: ?Sized, H: ?Sized, S: ?Sized, B: ?Sized> {
    ctx: &'c Context<'a, R, H, S, B>,
}

impl<'c, 'a, R, H, S, B> RollbackCoordinator<'c, 'a, R, H, S, B>
where
    R: Runtime + ?Sized,
    H: HttpTransport + ?Sized,
    S: StateStore + ?Sized,
    B: BackupStore + ?Sized,
{
    pub fn new(ctx: &'c Context<'a, R, H, S, B>) -> Self {
        Self { ctx }
    }

    pub async fn rollback(&self, mode: RollbackMode) -> Result<RollbackOutcome, RollbackError> {
        tracing::info!(environment = %self.ctx.settings.environment, %mode, "rollback started");
        let mut incidents = Vec::new();

        let container_failure = match mode {
            RollbackMode::Backup => None,
            RollbackMode::Auto | RollbackMode::Container => {
                match self.run_tier(RollbackTier::Container, &mut incidents).await {
                    Ok(restored) => {
                        return Ok(outcome(RollbackTier::Container, restored, incidents));
                    }
                    Err(e) if mode == RollbackMode::Container => {
                        return Err(RollbackError::Tier {
                            tier: RollbackTier::Container,
                            source: e,
                            incident: incidents.pop(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!("container rollback failed, falling back to backup: {}", e);
                        Some(e)
                    }
                }
            }
        };

        match self.run_tier(RollbackTier::Backup, &mut incidents).await {
            Ok(restored) => Ok(outcome(RollbackTier::Backup, restored, incidents)),
            Err(backup) => match container_failure {
                Some(container) => Err(RollbackError::Exhausted {
                    container,
                    backup,
                    incidents,
                }),
                None => Err(RollbackError::Tier {
                    tier: RollbackTier::Backup,
                    source: backup,
                    incident: incidents.pop(),
                }),
            },
        }
    }

    /// Run one tier between two slot captures and persist the snapshot.
    async fn run_tier(
        &self,
        tier: RollbackTier,
        incidents: &mut Vec<String>,
    ) -> Result<Restored, TierError> {
        let ctx = self.ctx;
        let before = incident::capture(ctx.runtime, &ctx.settings.slots.name).await;
        let result = match tier {
            RollbackTier::Container => self.container_tier().await,
            RollbackTier::Backup => self.backup_tier().await,
        };
        let outcome = match &result {
            Ok(r) if !r.changed => format!("{} rollback: already in place on {}", tier, r.color),
            Ok(r) => format!("{} rollback: {} now serves {}", tier, r.color, r.image),
            Err(e) => format!("{} rollback failed: {}", tier, e),
        };
        let operation = format!("rollback-{}", tier);
        if let Some(key) = incident::record(
            ctx.runtime,
            ctx.store,
            &ctx.settings.slots.name,
            &ctx.settings.environment,
            &operation,
            before,
            &outcome,
        )
        .await
        {
            incidents.push(key);
        }
        result
    }

    async fn container_tier(&self) -> Result<Restored, TierError> {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let resolver = ctx.resolver();

        let active = match resolver.resolve_active().await {
            Ok((active, _)) => resolver.describe(active).await?,
            Err(StateError::NoActiveSlot(_)) => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(slot) = &active
            && slot.is_rollback()
            && self.production_healthy().await
        {
            tracing::info!(slot = %slot.color, "rollback slot already serving and healthy");
            return Ok(Restored {
                color: slot.color,
                image: slot.image.clone().ok_or_else(|| {
                    TierError::NoTarget(format!("{} slot has no version label", slot.color))
                })?,
                changed: false,
            });
        }

        let (target, failing) = match &active {
            Some(slot) => (slot.color.other(), slot.image.clone()),
            None => self.stopped_target().await?,
        };
        let image = self.container_target_image(failing.as_ref(), target).await?;
        tracing::info!(slot = %target, %image, "rolling back to previous image");

        if !ctx.runtime.image_exists(&image).await? {
            ctx.runtime.pull_image(&image).await?;
        }

        if let Some(slot) = &active {
            match ctx
                .runtime
                .stop_container(&slot.container, settings.slots.stop_timeout)
                .await
            {
                Ok(()) | Err(ContainerError::NotRunning(_)) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.start_and_validate(target, &image).await?;

        if let Some(slot) = &active {
            // The rolled-back slot already serves; a leftover container is harmless.
            if let Err(e) = retire(ctx.runtime, &slot.container, settings.slots.stop_timeout).await {
                tracing::warn!(slot = %slot.color, "could not remove failed slot: {}", e);
            }
        }

        Ok(Restored {
            color: target,
            image,
            changed: true,
        })
    }

    async fn backup_tier(&self) -> Result<Restored, TierError> {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let resolver = ctx.resolver();

        let mut failing = None;
        for color in SlotColor::ALL {
            if let Some(slot) = resolver.describe(color).await?
                && slot.is_running()
            {
                failing = slot.image;
            }
        }
        // Nothing is stopped unless there is something to restore.
        let backups = ctx.backup_manager();
        let record = backups
            .latest(BackupKind::Data)
            .await?
            .ok_or(crate::backup::BackupError::NotFound(BackupKind::Data))?;

        for color in SlotColor::ALL {
            retire(
                ctx.runtime,
                &settings.slots.name.container_id(color),
                settings.slots.stop_timeout,
            )
            .await?;
        }
        tracing::info!("all slots stopped for backup restore");
        backups.restore(&record).await?;

        let image = self.backup_target_image(failing.as_ref()).await?;
        if !ctx.runtime.image_exists(&image).await? {
            ctx.runtime.pull_image(&image).await?;
        }

        let color = SlotColor::Blue;
        self.start_and_validate(color, &image).await?;
        Ok(Restored {
            color,
            image,
            changed: true,
        })
    }

    /// With no slot running: the stopped slot deployed longest ago, plus the
    /// image of the newer one as the image to move away from. A slot with no
    /// deployment-time label counts as oldest.
    async fn stopped_target(&self) -> Result<(SlotColor, Option<ImageRef>), TierError> {
        let resolver = self.ctx.resolver();
        let mut slots = Vec::with_capacity(2);
        for color in SlotColor::ALL {
            if let Some(slot) = resolver.describe(color).await? {
                slots.push(slot);
            }
        }
        slots.sort_by_key(Slot::deployed_at);
        let mut slots = slots.into_iter();
        Ok(match (slots.next(), slots.next()) {
            (Some(older), Some(newer)) => (older.color, newer.image),
            (Some(only), None) => (only.color, None),
            _ => (SlotColor::Blue, None),
        })
    }

    /// LastKnownGood first, then the target slot's version label. Never the
    /// `failing` image.
    async fn container_target_image(
        &self,
        failing: Option<&ImageRef>,
        target: SlotColor,
    ) -> Result<ImageRef, TierError> {
        if let Some(lkg) = self.known_good().await
            && let Some(image) = lkg.rollback_image(failing)
        {
            return Ok(image.clone());
        }

        let complement = self.ctx.resolver().describe(target).await?;
        match complement.and_then(|s| s.image) {
            Some(image) if Some(&image) != failing => Ok(image),
            Some(image) => Err(TierError::NoTarget(format!(
                "{} slot holds {}, the image being rolled back from",
                target, image
            ))),
            None => Err(TierError::NoTarget(format!(
                "no LastKnownGood record and no {} slot to return to",
                target
            ))),
        }
    }

    /// LastKnownGood current, else the newest local image of the repository
    /// that is not the one that was failing.
    async fn backup_target_image(&self, failing: Option<&ImageRef>) -> Result<ImageRef, TierError> {
        if let Some(lkg) = self.known_good().await {
            return Ok(lkg.current.image);
        }

        let repository = self.ctx.settings.image.repository();
        let mut images = self.ctx.runtime.list_images(&repository).await?;
        images.sort_by(|a, b| b.created.cmp(&a.created));
        let candidate = images
            .iter()
            .flat_map(|summary| summary.tags.iter())
            .filter_map(|tag| ImageRef::parse(tag).ok())
            .filter(|image| image.same_repository(&self.ctx.settings.image))
            .find(|image| Some(image) != failing);
        match candidate {
            Some(image) => {
                tracing::warn!(%image, "no LastKnownGood record, using newest local image");
                Ok(image)
            }
            None => Err(TierError::NoTarget(format!(
                "no LastKnownGood record and no other local image of {}",
                repository
            ))),
        }
    }

    async fn known_good(&self) -> Option<LastKnownGood> {
        match known_good::load(self.ctx.store, &self.ctx.settings.environment).await {
            Ok(lkg) => lkg,
            Err(e) => {
                tracing::warn!("ignoring unreadable LastKnownGood: {}", e);
                None
            }
        }
    }

    async fn production_healthy(&self) -> bool {
        let settings = self.ctx.settings;
        matches!(
            self.ctx
                .probe()
                .http_get(settings.slots.production_port, &settings.health.path)
                .await,
            Ok(response) if response.is_success()
        )
    }

    /// Recreate `color` on the production port as a rollback slot and wait
    /// for both checks.
    async fn start_and_validate(&self, color: SlotColor, image: &ImageRef) -> Result<ContainerId, TierError> {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let config = container_config(
            settings,
            color,
            image,
            settings.slots.production_port,
            ctx.container_env.clone(),
            true,
            Utc::now(),
        );
        let container = launch(ctx.runtime, &config, settings.slots.stop_timeout).await?;
        let probe = ctx.probe();
        probe.await_healthy(&container, &settings.health.container).await?;
        probe
            .http_healthy(settings.slots.production_port, &settings.health.path, &settings.health.http)
            .await?;
        tracing::info!(slot = %color, %image, "rollback slot healthy on production port");
        Ok(container)
    }
}

fn outcome(tier: RollbackTier, restored: Restored, incidents: Vec<String>) -> RollbackOutcome {
    RollbackOutcome {
        tier,
        color: restored.color,
        image: restored.image,
        changed: restored.changed,
        incidents,
    }
}
