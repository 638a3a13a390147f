// ABOUTME: Slot state resolution: which color owns production and which is the backup.
// ABOUTME: Also builds the labeled container config both deploy and rollback start slots from.

use crate::config::{Settings, parse_env_file};
use crate::runtime::{ContainerConfig, ContainerError, ContainerOps, ContainerState, HealthState, PortMapping};
use crate::shell::{RemoteShell, quote_path};
use crate::types::{ContainerId, ImageRef, SlotColor, SlotName};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Container labels slotctl writes and reads.
pub mod labels {
    pub const MANAGED: &str = "slotctl.managed";
    pub const SLOT: &str = "slotctl.slot";
    pub const ENVIRONMENT: &str = "slotctl.environment";
    /// Always the image the container was created from.
    pub const VERSION: &str = "slotctl.version";
    pub const DEPLOYMENT_TIME: &str = "slotctl.deployment-time";
    pub const ROLLBACK: &str = "slotctl.rollback";
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no running slot for {0} (neither blue nor green is up)")]
    NoActiveSlot(SlotName),

    #[error("both slots of {0} are running; resolve manually before deploying")]
    Ambiguous(SlotName),

    #[error("cannot inspect slot containers: {0}")]
    Runtime(#[from] ContainerError),
}

/// A point-in-time view of one slot container.
#[derive(Debug, Clone)]
pub struct Slot {
    pub color: SlotColor,
    pub container: ContainerId,
    /// From the version label, else the image the runtime reports.
    pub image: Option<ImageRef>,
    pub state: ContainerState,
    pub health: Option<HealthState>,
    pub host_ports: Vec<u16>,
    pub labels: HashMap<String, String>,
}

impl Slot {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn binds(&self, port: u16) -> bool {
        self.host_ports.contains(&port)
    }

    /// Started by a rollback rather than a deploy.
    pub fn is_rollback(&self) -> bool {
        self.labels.get(labels::ROLLBACK).map(String::as_str) == Some("true")
    }

    pub fn deployed_at(&self) -> Option<DateTime<Utc>> {
        self.labels
            .get(labels::DEPLOYMENT_TIME)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Reads slot state from the runtime. Never mutates anything.
pub struct SlotResolver<'a, R: ContainerOps + ?Sized> {
    runtime: &'a R,
    name: &'a SlotName,
}

impl<'a, R: ContainerOps + ?Sized> SlotResolver<'a, R> {
    pub fn new(runtime: &'a R, name: &'a SlotName) -> Self {
        Self { runtime, name }
    }

    /// `(active, backup)`: the running slot and its complement.
    pub async fn resolve_active(&self) -> Result<(SlotColor, SlotColor), StateError> {
        let mut running = Vec::with_capacity(2);
        for color in SlotColor::ALL {
            if let Some(slot) = self.describe(color).await?
                && slot.is_running()
            {
                running.push(color);
            }
        }
        match running.as_slice() {
            [active] => {
                tracing::debug!(slot = %self.name, active = %active, "resolved active slot");
                Ok((*active, self.target_for(*active)))
            }
            [] => Err(StateError::NoActiveSlot(self.name.clone())),
            _ => Err(StateError::Ambiguous(self.name.clone())),
        }
    }

    pub fn target_for(&self, active: SlotColor) -> SlotColor {
        active.other()
    }

    /// `None` when the slot's container does not exist.
    pub async fn describe(&self, color: SlotColor) -> Result<Option<Slot>, StateError> {
        let id = self.name.container_id(color);
        let info = match self.runtime.inspect_container(&id).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let image = info
            .labels
            .get(labels::VERSION)
            .and_then(|v| ImageRef::parse(v).ok())
            .or_else(|| ImageRef::parse(&info.image).ok());
        Ok(Some(Slot {
            color,
            container: id,
            image,
            state: info.state,
            health: info.health,
            host_ports: info.host_ports,
            labels: info.labels,
        }))
    }
}

/// Container config for `color` running `image`, published on `host_port`.
pub fn container_config(
    settings: &Settings,
    color: SlotColor,
    image: &ImageRef,
    host_port: u16,
    env: HashMap<String, String>,
    rollback: bool,
    started_at: DateTime<Utc>,
) -> ContainerConfig {
    let mut labels = HashMap::new();
    labels.insert(labels::MANAGED.to_string(), "true".to_string());
    labels.insert(labels::SLOT.to_string(), color.to_string());
    labels.insert(labels::ENVIRONMENT.to_string(), settings.environment.clone());
    labels.insert(labels::VERSION.to_string(), image.to_string());
    labels.insert(labels::DEPLOYMENT_TIME.to_string(), started_at.to_rfc3339());
    labels.insert(labels::ROLLBACK.to_string(), rollback.to_string());

    ContainerConfig {
        name: settings.container_name(color),
        image: image.clone(),
        env,
        labels,
        ports: vec![PortMapping {
            host_port,
            container_port: settings.slots.container_port,
            host_ip: None,
        }],
        volumes: settings.slots.volumes.clone(),
        healthcheck: Some(settings.slots.healthcheck.clone()),
        stop_timeout: Some(settings.slots.stop_timeout),
    }
}

/// Stop then remove a container. Already stopped or missing is fine.
pub async fn retire<R: ContainerOps + ?Sized>(
    runtime: &R,
    id: &ContainerId,
    stop_timeout: std::time::Duration,
) -> Result<(), ContainerError> {
    match runtime.stop_container(id, stop_timeout).await {
        Ok(()) | Err(ContainerError::NotRunning(_)) => {}
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e),
    }
    match runtime.remove_container(id, true).await {
        Err(e) if !e.is_not_found() => Err(e),
        _ => Ok(()),
    }
}

/// Replace whatever container holds `config.name` and start the new one.
/// A container that fails to start is removed again.
pub async fn launch<R: ContainerOps + ?Sized>(
    runtime: &R,
    config: &ContainerConfig,
    stop_timeout: std::time::Duration,
) -> Result<ContainerId, ContainerError> {
    retire(runtime, &ContainerId::new(config.name.clone()), stop_timeout).await?;
    let id = runtime.create_container(config).await?;
    if let Err(e) = runtime.start_container(&id).await {
        if let Err(cleanup) = runtime.remove_container(&id, true).await {
            tracing::warn!("could not remove {} after failed start: {}", id, cleanup);
        }
        return Err(e);
    }
    tracing::info!(container = %config.name, image = %config.image, "slot container started");
    Ok(id)
}

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("cannot read env file {path}: {source}")]
    Read {
        path: String,
        source: crate::shell::ShellError,
    },

    #[error("env file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Container environment: the env file on the target host, overridden by
/// the resolved `env:` entries.
pub async fn slot_environment<S: RemoteShell + ?Sized>(
    shell: &S,
    settings: &Settings,
) -> Result<HashMap<String, String>, EnvFileError> {
    let mut env = match &settings.slots.env_file {
        Some(path) => {
            let content = shell
                .run_checked(&format!("cat {}", quote_path(path)))
                .await
                .map_err(|source| EnvFileError::Read {
                    path: path.clone(),
                    source,
                })?;
            parse_env_file(&content).map_err(|e| EnvFileError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?
        }
        None => HashMap::new(),
    };
    env.extend(settings.slots.env.clone());
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn settings() -> Settings {
        Config::from_yaml(
            r#"
service: shop
image: ghcr.io/acme/shop
environments:
  production:
    target_server: local
    control_user: deploy
    slot_name: shop-prod
    production_port: 8080
    container_port: 3000
    env: { MODE: prod }
"#,
        )
        .unwrap()
        .settings("production")
        .unwrap()
    }

    #[test]
    fn container_config_labels_version_from_image() {
        let settings = settings();
        let image = ImageRef::parse("ghcr.io/acme/shop:v7").unwrap();
        let config = container_config(
            &settings,
            SlotColor::Green,
            &image,
            settings.slots.temp_port,
            HashMap::new(),
            false,
            Utc::now(),
        );
        assert_eq!(config.name, "shop-prod-green");
        assert_eq!(config.labels[labels::VERSION], image.to_string());
        assert_eq!(config.labels[labels::SLOT], "green");
        assert_eq!(config.labels[labels::ROLLBACK], "false");
        assert_eq!(config.ports[0].host_port, 8081);
        assert_eq!(config.ports[0].container_port, 3000);
        assert!(config.healthcheck.is_some());
    }

    #[tokio::test]
    async fn env_entries_override_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "MODE=dev\nDB=postgres://db\n").unwrap();
        let mut settings = settings();
        settings.slots.env_file = Some(path.to_string_lossy().into_owned());

        let env = slot_environment(&crate::shell::LocalShell, &settings)
            .await
            .unwrap();
        assert_eq!(env["MODE"], "prod");
        assert_eq!(env["DB"], "postgres://db");
    }
}
