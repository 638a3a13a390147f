// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: Container creation config, inspect results, and exec results.

use crate::types::{ContainerId, ImageRef};
use std::collections::HashMap;
use std::time::Duration;

/// Everything needed to create one slot container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    pub healthcheck: Option<HealthcheckConfig>,
    pub stop_timeout: Option<Duration>,
}

/// A host port published to a container port (TCP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    /// Bind address on the host; all interfaces when unset.
    pub host_ip: Option<String>,
}

/// Bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// Parse `source:target[:ro]`.
    pub fn parse(mount: &str) -> Result<Self, String> {
        let parts: Vec<&str> = mount.split(':').collect();
        match parts.as_slice() {
            [source, target] if !source.is_empty() && !target.is_empty() => Ok(Self {
                source: source.to_string(),
                target: target.to_string(),
                read_only: false,
            }),
            [source, target, mode] if !source.is_empty() && !target.is_empty() => {
                let read_only = match *mode {
                    "ro" => true,
                    "rw" => false,
                    other => return Err(format!("unknown volume mode {:?} in {}", other, mount)),
                };
                Ok(Self {
                    source: source.to_string(),
                    target: target.to_string(),
                    read_only,
                })
            }
            _ => Err(format!("volume must be source:target[:ro], got {}", mount)),
        }
    }
}

/// Runtime-level healthcheck attached at creation.
#[derive(Debug, Clone)]
pub struct HealthcheckConfig {
    /// Command in runtime form, e.g. `["CMD-SHELL", "curl -f localhost:3000/health"]`.
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

/// Result of inspecting one container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// `None` when the container has no runtime healthcheck.
    pub health: Option<HealthState>,
    pub created: String,
    pub labels: HashMap<String, String>,
    /// Host ports the container is configured to publish.
    pub host_ports: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerState {
    /// Parse the lowercase state string runtimes report in listings.
    /// Podman's transient `stopping` and `stopped` read as exited.
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Exited,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
        }
    }
}

/// Runtime healthcheck status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

/// A command run inside a container.
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
}

impl ExecConfig {
    pub fn shell(command: &str) -> Self {
        Self {
            cmd: vec!["sh".to_string(), "-c".to_string(), command.to_string()],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}
