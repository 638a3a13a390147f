// ABOUTME: Configuration types and parsing for slotctl.yml.
// ABOUTME: Handles YAML parsing, validation, and resolution into per-environment Settings.

mod backup;
mod env_value;
mod environment;
mod health;
mod init;
mod settings;

pub use backup::{BackupConfig, RetentionConfig};
pub use env_value::{EnvValue, parse_env_file, resolve_env_map};
pub use environment::{EnvironmentConfig, Target};
pub use health::{
    BackoffConfig, ContainerCheckConfig, HealthConfig, LoadCheckConfig, LogsCheckConfig,
};
pub use init::init_config;
pub use settings::{
    BackupSettings, ConnectionSettings, HealthSettings, STATE_DIR, Settings, SlotSettings,
};

use crate::backup::RetentionPolicy;
use crate::error::{Error, Result};
use crate::health::BackoffPolicy;
use crate::runtime::{HealthcheckConfig, RuntimeConfig, RuntimeType, VolumeMount};
use crate::types::{ImageRef, SlotName};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "slotctl.yml";
pub const CONFIG_FILENAME_ALT: &str = "slotctl.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".slotctl/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: String,

    /// Repository; the tag comes from the deploy invocation.
    pub image: ImageRef,

    pub environments: BTreeMap<String, EnvironmentConfig>,

    #[serde(default)]
    pub health: HealthConfig,

    /// Temporary port is `production_port + temp_port_offset`.
    #[serde(default = "default_temp_port_offset")]
    pub temp_port_offset: u16,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub stop: StopConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub lease: LeaseConfig,

    /// Runtime override; detected on the target when unset.
    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub runtime_socket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopConfig {
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            timeout: default_stop_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_lease_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: default_lease_ttl(),
        }
    }
}

fn default_temp_port_offset() -> u16 {
    1
}

fn default_grace_period() -> Duration {
    Duration::from_secs(60)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_lease_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the first config file found in `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .map(|path| Self::load(&path))
            .unwrap_or_else(|| Err(Error::ConfigNotFound(dir.to_path_buf())))
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))
    }

    /// Check the whole file, every environment included.
    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(Error::Config("service cannot be empty".to_string()));
        }
        if self.environments.is_empty() {
            return Err(Error::Config("at least one environment is required".to_string()));
        }
        for (name, env) in &self.environments {
            validate_environment(name, env, self.temp_port_offset)?;
        }
        for (label, backoff) in [
            ("health.container", &self.health.container),
            ("health.http", &self.health.http),
        ] {
            if backoff.max_attempts == 0 {
                return Err(Error::Config(format!(
                    "{}.max_attempts must be at least 1",
                    label
                )));
            }
        }
        if !self.health.path.starts_with('/') {
            return Err(Error::Config(format!(
                "health.path must start with '/': {}",
                self.health.path
            )));
        }
        if self.backup.retention.max_per_kind == 0 {
            return Err(Error::Config(
                "backup.retention.max_per_kind must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.health.load.min_success_ratio) {
            return Err(Error::Config(
                "health.load.min_success_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate and resolve one environment. Environment variable references
    /// in `env:` are read here and nowhere else.
    pub fn settings(&self, environment: &str) -> Result<Settings> {
        self.validate()?;
        let env = self.environment(environment)?;

        let target = Target::parse(&env.target_server).map_err(Error::Config)?;
        let slot_name = SlotName::new(&env.slot_name)
            .map_err(|e| Error::Config(format!("environments.{}.slot_name: {}", environment, e)))?;
        let volumes = env
            .volumes
            .iter()
            .map(|v| VolumeMount::parse(v))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Config)?;

        let check = &self.health.check;
        let healthcheck = HealthcheckConfig {
            test: vec![
                "CMD-SHELL".to_string(),
                check.command_for(env.container_port, &self.health.path),
            ],
            interval: check.interval,
            timeout: check.timeout,
            retries: check.retries,
            start_period: check.start_period,
        };

        let backoff = |b: &BackoffConfig| {
            let policy = BackoffPolicy::new(b.max_attempts, b.interval);
            match b.deadline {
                Some(deadline) => policy.with_deadline(deadline),
                None => policy,
            }
        };

        Ok(Settings {
            service: self.service.clone(),
            environment: environment.to_string(),
            image: self.image.clone(),
            connection: ConnectionSettings {
                target,
                control_user: env.control_user.clone(),
                ssh_key: env.ssh_key.clone(),
                trust_first_connection: env.trust_first_connection,
            },
            slots: SlotSettings {
                name: slot_name,
                production_port: env.production_port,
                temp_port: env.production_port + self.temp_port_offset,
                container_port: env.container_port,
                env_file: env.env_file.clone(),
                env: resolve_env_map(&env.env)?,
                volumes,
                healthcheck,
                stop_timeout: self.stop.timeout,
            },
            health: HealthSettings {
                path: self.health.path.clone(),
                container: backoff(&self.health.container),
                http: backoff(&self.health.http),
                request_timeout: self.health.request_timeout,
                log_lines: self.health.logs.lines,
                error_threshold: self.health.logs.error_threshold,
                load_requests: self.health.load.requests,
                min_success_ratio: self.health.load.min_success_ratio,
                metrics_path: self.health.metrics_path.clone(),
            },
            backup: BackupSettings {
                directory: self.backup.directory.clone(),
                data_dir: self.backup.data_dir.clone(),
                container_data_dir: self.backup.container_data_dir.clone(),
                config_dir: self.backup.config_dir.clone(),
                database_command: self.backup.database_command.clone(),
                retention: RetentionPolicy {
                    max_age: self.backup.retention.max_age,
                    max_per_kind: self.backup.retention.max_per_kind,
                },
            },
            grace_period: self.cleanup.grace_period,
            lease_ttl: self.lease.ttl,
            runtime: RuntimeConfig {
                runtime: self.runtime,
                socket: self.runtime_socket.clone(),
            },
            state_dir: STATE_DIR.to_string(),
        })
    }
}

fn validate_environment(name: &str, env: &EnvironmentConfig, temp_port_offset: u16) -> Result<()> {
    let field = |f: &str| format!("environments.{}.{}", name, f);

    for (value, key) in [
        (&env.target_server, "target_server"),
        (&env.control_user, "control_user"),
        (&env.slot_name, "slot_name"),
    ] {
        if value.trim().is_empty() {
            return Err(Error::Config(format!("{} cannot be empty", field(key))));
        }
    }
    if env.production_port == 0 {
        return Err(Error::Config(format!("{} must be non-zero", field("production_port"))));
    }
    if env.container_port == 0 {
        return Err(Error::Config(format!("{} must be non-zero", field("container_port"))));
    }
    if temp_port_offset == 0 {
        return Err(Error::Config("temp_port_offset must be non-zero".to_string()));
    }
    if env.production_port.checked_add(temp_port_offset).is_none() {
        return Err(Error::Config(format!(
            "{} + temp_port_offset exceeds 65535",
            field("production_port")
        )));
    }
    Ok(())
}
