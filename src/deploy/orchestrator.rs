// ABOUTME: DeploymentOrchestrator drives one rollout through the deployment state chain.
// ABOUTME: Records LastKnownGood after the switch and an incident snapshot on any failure.

use super::error::{DeployError, DeployFailure};
use super::state::DeployPhase;
use super::transitions::SwitchError;
use super::{Deployment, DeployOutcome};
use crate::backup::BackupStore;
use crate::context::Context;
use crate::diagnostics::{Diagnostics, Warning};
use crate::health::HttpTransport;
use crate::incident::{self, SlotReport};
use crate::known_good;
use crate::runtime::Runtime;
use crate::slot::StateError;
use crate::state::StateStore;
use crate::types::ImageRef;

pub struct DeploymentOrchestrator<'c, 'a, R: ?Sized, H: ?Sized, S: ?Sized, B: ?Sized> {
    ctx: &'c Context<'a, R, H, S, B>,
}

impl<'c, 'a, R, H, S, B> DeploymentOrchestrator<'c, 'a, R, H, S, B>
where
    R: Runtime + ?Sized,
    H: HttpTransport + ?Sized,
    S: StateStore + ?Sized,
    B: BackupStore + ?Sized,
{
    pub fn new(ctx: &'c Context<'a, R, H, S, B>) -> Self {
        Self { ctx }
    }

    /// Roll `image` out to the inactive slot. Never invokes rollback.
    pub async fn deploy(&self, image: ImageRef) -> Result<DeployOutcome, DeployFailure> {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let before = incident::capture(ctx.runtime, &settings.slots.name).await;
        let mut diagnostics = Diagnostics::default();

        let active = match ctx.resolver().resolve_active().await {
            Ok((active, _)) => Some(active),
            Err(StateError::NoActiveSlot(_)) => None,
            Err(e) => return Err(self.fail(DeployPhase::Init, e.into(), false, before).await),
        };

        let deployment = Deployment::new(settings, &ctx.container_env, image, active);
        tracing::info!(
            environment = %settings.environment,
            image = %deployment.image(),
            active = ?active,
            target = %deployment.target(),
            "deployment started"
        );

        let deployment = deployment
            .backup_current(&ctx.backup_manager(), &mut diagnostics)
            .await;
        let backup = deployment.state().backup.clone();

        let deployment = match deployment.pull(ctx.runtime).await {
            Ok(d) => d,
            Err(e) => return Err(self.fail(DeployPhase::BackupTaken, e, false, before).await),
        };

        let deployment = match deployment.start_new(ctx.runtime).await {
            Ok(d) => d,
            Err(e) => return Err(self.fail(DeployPhase::ImagePulled, e, false, before).await),
        };

        let probe = ctx.probe();
        let deployment = match deployment.validate_new(&probe).await {
            Ok(d) => d,
            Err((failed, e)) => {
                let phase = failed.phase();
                if let Err(cleanup) = failed.discard(ctx.runtime).await {
                    tracing::warn!("could not remove unhealthy new slot: {}", cleanup);
                }
                return Err(self.fail(phase, e, false, before).await);
            }
        };

        let deployment = match deployment.switch_traffic(ctx.runtime, &probe).await {
            Ok(d) => d,
            Err(SwitchError::ActiveIntact(failed, e)) => {
                let phase = failed.phase();
                if let Err(cleanup) = failed.discard(ctx.runtime).await {
                    tracing::warn!("could not remove new slot: {}", cleanup);
                }
                return Err(self.fail(phase, e, false, before).await);
            }
            Err(SwitchError::ProductionUnbound(e)) => {
                return Err(self.fail(DeployPhase::NewSlotHealthy, e, true, before).await);
            }
        };

        if let Err(e) = known_good::record(
            ctx.store,
            &settings.environment,
            deployment.target(),
            deployment.image(),
        )
        .await
        {
            diagnostics.warn(Warning::known_good(format!(
                "LastKnownGood not recorded, rollback will fall back to slot labels: {}",
                e
            )));
        }

        let deployment = deployment
            .cleanup_old(ctx.runtime, &mut diagnostics)
            .await
            .complete();

        tracing::info!(
            environment = %settings.environment,
            slot = %deployment.target(),
            image = %deployment.image(),
            "deployment complete"
        );

        Ok(DeployOutcome {
            color: deployment.target(),
            previous: deployment.active(),
            image: deployment.image().clone(),
            container: deployment.deployed_container().clone(),
            backup,
            warnings: diagnostics.into_warnings(),
        })
    }

    async fn fail(
        &self,
        phase: DeployPhase,
        error: DeployError,
        production_unbound: bool,
        before: Vec<SlotReport>,
    ) -> DeployFailure {
        let ctx = self.ctx;
        tracing::error!(%phase, production_unbound, "deployment failed: {}", error);
        let incident = incident::record(
            ctx.runtime,
            ctx.store,
            &ctx.settings.slots.name,
            &ctx.settings.environment,
            "deploy",
            before,
            &error.to_string(),
        )
        .await;
        DeployFailure {
            phase,
            error,
            production_unbound,
            incident,
        }
    }
}
