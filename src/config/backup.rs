// ABOUTME: Backup locations and retention limits.
// ABOUTME: Directories are paths on the target host.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Root of the `<kind>/` partitions.
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Host directory holding the service's data, restored by rollback.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Data path inside the container, preferred while a slot runs.
    #[serde(default)]
    pub container_data_dir: Option<String>,

    #[serde(default)]
    pub config_dir: Option<String>,

    /// Dump command run inside the active container; stdout is the dump.
    #[serde(default)]
    pub database_command: Option<String>,

    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            data_dir: None,
            container_data_dir: None,
            config_dir: None,
            database_command: None,
            retention: RetentionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_age", with = "humantime_serde")]
    pub max_age: Duration,

    #[serde(default = "default_max_per_kind")]
    pub max_per_kind: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            max_per_kind: default_max_per_kind(),
        }
    }
}

fn default_directory() -> String {
    "~/.local/share/slotctl/backups".to_string()
}

fn default_max_age() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

fn default_max_per_kind() -> usize {
    50
}
