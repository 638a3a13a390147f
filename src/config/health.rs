// ABOUTME: Health verification settings: polling budgets, HTTP path, report thresholds.
// ABOUTME: Also the in-container healthcheck attached to every slot container.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_path")]
    pub path: String,

    /// Polling budget for the runtime healthcheck.
    #[serde(default = "default_container_backoff")]
    pub container: BackoffConfig,

    /// Polling budget for the HTTP endpoint.
    #[serde(default = "default_http_backoff")]
    pub http: BackoffConfig,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub check: ContainerCheckConfig,

    #[serde(default)]
    pub logs: LogsCheckConfig,

    #[serde(default)]
    pub load: LoadCheckConfig,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            container: default_container_backoff(),
            http: default_http_backoff(),
            request_timeout: default_request_timeout(),
            check: ContainerCheckConfig::default(),
            logs: LogsCheckConfig::default(),
            load: LoadCheckConfig::default(),
            metrics_path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Overall wall-clock bound, on top of the attempt budget.
    #[serde(default, with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

/// Runtime healthcheck attached to slot containers.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerCheckConfig {
    /// Run with `sh -c` inside the container. Defaults to fetching the health
    /// path on the container port with curl or wget.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_check_retries")]
    pub retries: u32,

    #[serde(default = "default_start_period", with = "humantime_serde")]
    pub start_period: Duration,
}

impl Default for ContainerCheckConfig {
    fn default() -> Self {
        Self {
            command: None,
            interval: default_check_interval(),
            timeout: default_check_timeout(),
            retries: default_check_retries(),
            start_period: default_start_period(),
        }
    }
}

impl ContainerCheckConfig {
    pub fn command_for(&self, container_port: u16, path: &str) -> String {
        self.command.clone().unwrap_or_else(|| {
            let url = format!("http://127.0.0.1:{}{}", container_port, path);
            format!("curl -fsS -o /dev/null {url} || wget -q -O /dev/null {url}")
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsCheckConfig {
    #[serde(default = "default_log_lines")]
    pub lines: u64,

    /// More error lines than this in the tail fails the logs check.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: usize,
}

impl Default for LogsCheckConfig {
    fn default() -> Self {
        Self {
            lines: default_log_lines(),
            error_threshold: default_error_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadCheckConfig {
    #[serde(default = "default_load_requests")]
    pub requests: u32,

    #[serde(default = "default_min_success_ratio")]
    pub min_success_ratio: f64,
}

impl Default for LoadCheckConfig {
    fn default() -> Self {
        Self {
            requests: default_load_requests(),
            min_success_ratio: default_min_success_ratio(),
        }
    }
}

fn default_path() -> String {
    "/health".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_container_backoff() -> BackoffConfig {
    BackoffConfig {
        max_attempts: 30,
        interval: Duration::from_secs(2),
        deadline: None,
    }
}

fn default_http_backoff() -> BackoffConfig {
    BackoffConfig {
        max_attempts: 10,
        interval: Duration::from_secs(3),
        deadline: None,
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_check_retries() -> u32 {
    3
}

fn default_start_period() -> Duration {
    Duration::from_secs(30)
}

fn default_log_lines() -> u64 {
    200
}

fn default_error_threshold() -> usize {
    5
}

fn default_load_requests() -> u32 {
    20
}

fn default_min_success_ratio() -> f64 {
    0.95
}
