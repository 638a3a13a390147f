// ABOUTME: Immutable, fully resolved settings for one environment.
// ABOUTME: Built once from Config; every component receives what it needs from here.

use super::environment::Target;
use crate::backup::RetentionPolicy;
use crate::health::BackoffPolicy;
use crate::runtime::{HealthcheckConfig, RuntimeConfig, VolumeMount};
use crate::types::{ImageRef, ParseImageRefError, SlotName};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Directory on the target holding leases, LastKnownGood and incidents.
pub const STATE_DIR: &str = "~/.local/state/slotctl";

#[derive(Debug, Clone)]
pub struct Settings {
    pub service: String,
    pub environment: String,
    /// Repository the deployed images come from.
    pub image: ImageRef,
    pub connection: ConnectionSettings,
    pub slots: SlotSettings,
    pub health: HealthSettings,
    pub backup: BackupSettings,
    pub grace_period: Duration,
    pub lease_ttl: Duration,
    pub runtime: RuntimeConfig,
    pub state_dir: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub target: Target,
    pub control_user: String,
    pub ssh_key: Option<PathBuf>,
    pub trust_first_connection: bool,
}

/// How slot containers are named, bound, and configured.
#[derive(Debug, Clone)]
pub struct SlotSettings {
    pub name: SlotName,
    pub production_port: u16,
    /// Where a new slot listens while it is validated.
    pub temp_port: u16,
    pub container_port: u16,
    pub env_file: Option<String>,
    /// Resolved `env:` entries; these override the env file.
    pub env: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub healthcheck: HealthcheckConfig,
    pub stop_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub path: String,
    pub container: BackoffPolicy,
    pub http: BackoffPolicy,
    pub request_timeout: Duration,
    pub log_lines: u64,
    pub error_threshold: usize,
    pub load_requests: u32,
    pub min_success_ratio: f64,
    pub metrics_path: String,
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub directory: String,
    pub data_dir: Option<String>,
    pub container_data_dir: Option<String>,
    pub config_dir: Option<String>,
    pub database_command: Option<String>,
    pub retention: RetentionPolicy,
}

impl Settings {
    /// Container name of the given slot.
    pub fn container_name(&self, color: crate::types::SlotColor) -> String {
        self.slots.name.container_name(color)
    }

    /// Image for a deploy argument. A bare tag (`v2`) selects a tag of the
    /// configured repository; anything with `/`, `:` or `@` is a full reference.
    pub fn deploy_image(&self, arg: &str) -> Result<ImageRef, ParseImageRefError> {
        let arg = arg.trim();
        if arg.is_empty() || arg.contains(['/', ':', '@']) {
            ImageRef::parse(arg)
        } else {
            Ok(self.image.with_tag(arg))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    fn settings() -> super::Settings {
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
"#,
        )
        .unwrap()
        .settings("production")
        .unwrap()
    }

    #[test]
    fn bare_tag_uses_configured_repository() {
        let image = settings().deploy_image("v2").unwrap();
        assert_eq!(image.to_string(), "ghcr.io/acme/shop:v2");
    }

    #[test]
    fn full_reference_is_taken_as_is() {
        let image = settings().deploy_image("registry.local/other:1.0").unwrap();
        assert_eq!(image.repository(), "registry.local/other");
        assert_eq!(image.tag(), Some("1.0"));
        assert!(settings().deploy_image("  ").is_err());
    }
}
