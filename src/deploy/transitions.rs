// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use crate::backup::{BackupKind, BackupManager, BackupStore};
use crate::diagnostics::{Diagnostics, Warning};
use crate::health::{HealthProbe, HttpTransport};
use crate::runtime::{ContainerError, ContainerOps, ImageOps};
use crate::slot::{container_config, launch, retire};

use super::Deployment;
use super::error::DeployError;
use super::state::{
    BackupTaken, Completed, ImagePulled, Initialized, OldSlotCleaned, SlotHealthy, SlotStarting,
    TrafficSwitched,
};

/// Result type for transitions whose failure leaves something to clean up.
pub type TransitionResult<'a, T, S> = Result<Deployment<'a, T>, (Deployment<'a, S>, DeployError)>;

/// How a traffic switch failed.
#[derive(Debug)]
pub enum SwitchError<'a> {
    /// The active slot still holds production; the new slot can be discarded.
    ActiveIntact(Deployment<'a, SlotHealthy>, DeployError),
    /// The active slot was stopped and the new slot is not healthy on the
    /// production port.
    ProductionUnbound(DeployError),
}

// =============================================================================
// Initialized -> BackupTaken
// =============================================================================

impl<'a> Deployment<'a, Initialized> {
    /// Best-effort data snapshot of the active slot. Failure is a warning.
    pub async fn backup_current<R, B>(
        self,
        backups: &BackupManager<'_, R, B>,
        diagnostics: &mut Diagnostics,
    ) -> Deployment<'a, BackupTaken>
    where
        R: ContainerOps + ?Sized,
        B: BackupStore + ?Sized,
    {
        let Some(active) = self.active else {
            tracing::info!("initial deployment, nothing to back up");
            return self.transition(BackupTaken::default());
        };

        let backup = match backups.create(BackupKind::Data).await {
            Ok(record) => Some(record),
            Err(e) => {
                diagnostics.warn(Warning::backup(format!(
                    "pre-deploy backup of {} slot skipped: {}",
                    active, e
                )));
                None
            }
        };
        self.transition(BackupTaken { backup })
    }
}

// =============================================================================
// BackupTaken -> ImagePulled
// =============================================================================

impl<'a> Deployment<'a, BackupTaken> {
    /// Pull the target image onto the host.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::ImagePull` if the image cannot be pulled.
    #[must_use = "deployment state must be used"]
    pub async fn pull<R: ImageOps + ?Sized>(
        self,
        runtime: &R,
    ) -> Result<Deployment<'a, ImagePulled>, DeployError> {
        runtime.pull_image(&self.image).await?;
        tracing::info!(image = %self.image, "image pulled");
        Ok(self.transition(ImagePulled))
    }
}

// =============================================================================
// ImagePulled -> SlotStarting
// =============================================================================

impl<'a> Deployment<'a, ImagePulled> {
    /// Replace any stale target container and start the new one on the
    /// temporary port.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Start` if the container cannot be created or started.
    #[must_use = "deployment state must be used"]
    pub async fn start_new<R: ContainerOps + ?Sized>(
        self,
        runtime: &R,
    ) -> Result<Deployment<'a, SlotStarting>, DeployError> {
        let slots = &self.settings.slots;
        let config = container_config(
            self.settings,
            self.target,
            &self.image,
            slots.temp_port,
            self.env.clone(),
            false,
            self.started_at,
        );
        let container = launch(runtime, &config, slots.stop_timeout)
            .await
            .map_err(|source| DeployError::Start {
                color: self.target,
                source,
            })?;
        Ok(self.transition(SlotStarting { container }))
    }
}

// =============================================================================
// SlotStarting -> SlotHealthy
// =============================================================================

impl<'a> Deployment<'a, SlotStarting> {
    /// Runtime health, then HTTP health on the temporary port.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure so the new slot can be discarded.
    #[must_use = "deployment state must be used"]
    pub async fn validate_new<R, H>(
        self,
        probe: &HealthProbe<'_, R, H>,
    ) -> TransitionResult<'a, SlotHealthy, SlotStarting>
    where
        R: ContainerOps + ?Sized,
        H: HttpTransport + ?Sized,
    {
        let health = &self.settings.health;
        let container = self.state.container.clone();
        if let Err(e) = probe.await_healthy(&container, &health.container).await {
            return Err((self, e.into()));
        }
        if let Err(e) = probe
            .http_healthy(self.settings.slots.temp_port, &health.path, &health.http)
            .await
        {
            return Err((self, e.into()));
        }
        tracing::info!(slot = %self.target, "new slot healthy on temporary port");
        Ok(self.transition(SlotHealthy { container }))
    }

    /// Stop and remove the new slot. The active slot is untouched.
    pub async fn discard<R: ContainerOps + ?Sized>(self, runtime: &R) -> Result<(), ContainerError> {
        retire(runtime, &self.state.container, self.settings.slots.stop_timeout).await
    }
}

// =============================================================================
// SlotHealthy -> TrafficSwitched
// =============================================================================

impl<'a> Deployment<'a, SlotHealthy> {
    /// Move the production port to the new slot.
    ///
    /// Stops the active slot, recreates the new slot bound to the production
    /// port, and validates it there. Between the stop and the new slot
    /// becoming healthy nothing serves production.
    ///
    /// # Errors
    ///
    /// `SwitchError::ActiveIntact` if the active slot could not be stopped;
    /// `SwitchError::ProductionUnbound` for any failure after that.
    #[must_use = "deployment state must be used"]
    pub async fn switch_traffic<R, H>(
        self,
        runtime: &R,
        probe: &HealthProbe<'_, R, H>,
    ) -> Result<Deployment<'a, TrafficSwitched>, SwitchError<'a>>
    where
        R: ContainerOps + ?Sized,
        H: HttpTransport + ?Sized,
    {
        let slots = &self.settings.slots;
        let health = &self.settings.health;

        if let Some(active) = self.active {
            let id = slots.name.container_id(active);
            match runtime.stop_container(&id, slots.stop_timeout).await {
                Ok(()) | Err(ContainerError::NotRunning(_)) => {}
                Err(e) if e.is_not_found() => {}
                Err(source) => {
                    return Err(SwitchError::ActiveIntact(
                        self,
                        DeployError::StopActive {
                            color: active,
                            source,
                        },
                    ));
                }
            }
            tracing::info!(slot = %active, "active slot stopped, production port released");
        }

        let config = container_config(
            self.settings,
            self.target,
            &self.image,
            slots.production_port,
            self.env.clone(),
            false,
            self.started_at,
        );
        let container = launch(runtime, &config, slots.stop_timeout)
            .await
            .map_err(|source| {
                SwitchError::ProductionUnbound(DeployError::Start {
                    color: self.target,
                    source,
                })
            })?;

        probe
            .await_healthy(&container, &health.container)
            .await
            .map_err(|e| SwitchError::ProductionUnbound(e.into()))?;
        probe
            .http_healthy(slots.production_port, &health.path, &health.http)
            .await
            .map_err(|e| SwitchError::ProductionUnbound(e.into()))?;

        tracing::info!(slot = %self.target, port = slots.production_port, "traffic switched");
        Ok(self.transition(TrafficSwitched { container }))
    }

    /// Stop and remove the new slot. The active slot is untouched.
    pub async fn discard<R: ContainerOps + ?Sized>(self, runtime: &R) -> Result<(), ContainerError> {
        retire(runtime, &self.state.container, self.settings.slots.stop_timeout).await
    }
}

// =============================================================================
// TrafficSwitched -> OldSlotCleaned
// =============================================================================

impl<'a> Deployment<'a, TrafficSwitched> {
    /// Wait out the grace period, then remove the superseded slot. Failures
    /// are warnings.
    pub async fn cleanup_old<R: ContainerOps + ?Sized>(
        self,
        runtime: &R,
        diagnostics: &mut Diagnostics,
    ) -> Deployment<'a, OldSlotCleaned> {
        if let Some(old) = self.active {
            let grace = self.settings.grace_period;
            if !grace.is_zero() {
                tracing::debug!(?grace, "waiting before removing old slot");
                tokio::time::sleep(grace).await;
            }
            let id = self.settings.slots.name.container_id(old);
            match retire(runtime, &id, self.settings.slots.stop_timeout).await {
                Ok(()) => tracing::info!(slot = %old, "old slot removed"),
                Err(e) => diagnostics.warn(Warning::cleanup(format!(
                    "could not remove old {} slot: {}",
                    old, e
                ))),
            }
        }
        let container = self.state.container.clone();
        self.transition(OldSlotCleaned { container })
    }
}

// =============================================================================
// OldSlotCleaned -> Completed
// =============================================================================

impl<'a> Deployment<'a, OldSlotCleaned> {
    pub fn complete(self) -> Deployment<'a, Completed> {
        let container = self.state.container.clone();
        self.transition(Completed { container })
    }
}
