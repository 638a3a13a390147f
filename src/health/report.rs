// ABOUTME: Operator health report for the active slot of an environment.
// ABOUTME: Container, HTTP, resource, log, and load checks; `full` runs them all.

use super::http::HttpTransport;
use super::probe::{HealthProbe, RuntimeHealth};
use crate::config::Settings;
use crate::runtime::{ExecConfig, Runtime};
use crate::slot::{SlotResolver, StateError};
use crate::types::{ContainerId, SlotColor};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Memory use at or above this share of the limit fails the resources check.
const MEMORY_FAIL_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    Container,
    Http,
    Resources,
    Logs,
    Load,
    #[default]
    Full,
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(ReportMode::Container),
            "http" => Ok(ReportMode::Http),
            "resources" => Ok(ReportMode::Resources),
            "logs" => Ok(ReportMode::Logs),
            "load" => Ok(ReportMode::Load),
            "full" => Ok(ReportMode::Full),
            other => Err(format!(
                "unknown health mode {:?} (container, http, resources, logs, load, full)",
                other
            )),
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportMode::Container => "container",
            ReportMode::Http => "http",
            ReportMode::Resources => "resources",
            ReportMode::Logs => "logs",
            ReportMode::Load => "load",
            ReportMode::Full => "full",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub check: &'static str,
    pub passed: bool,
    /// Reported but never fails the report.
    pub informational: bool,
    pub detail: String,
}

impl Finding {
    fn new(check: &'static str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed,
            informational: false,
            detail: detail.into(),
        }
    }

    fn info(check: &'static str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            informational: true,
            ..Self::new(check, passed, detail)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub environment: String,
    pub active: SlotColor,
    pub findings: Vec<Finding>,
}

impl HealthReport {
    pub fn passed(&self) -> bool {
        self.findings.iter().all(|f| f.passed || f.informational)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.passed && !f.informational)
    }
}

pub struct Reporter<'a, R: Runtime + ?Sized, H: HttpTransport + ?Sized> {
    runtime: &'a R,
    http: &'a H,
    settings: &'a Settings,
}

impl<'a, R: Runtime + ?Sized, H: HttpTransport + ?Sized> Reporter<'a, R, H> {
    pub fn new(runtime: &'a R, http: &'a H, settings: &'a Settings) -> Self {
        Self {
            runtime,
            http,
            settings,
        }
    }

    pub async fn run(&self, mode: ReportMode) -> Result<HealthReport, StateError> {
        let resolver = SlotResolver::new(self.runtime, &self.settings.slots.name);
        let (active, _) = resolver.resolve_active().await?;
        let container = self.settings.slots.name.container_id(active);

        let mut findings = Vec::new();
        let all = mode == ReportMode::Full;
        if all || mode == ReportMode::Container {
            findings.extend(self.container(&container).await);
        }
        if all || mode == ReportMode::Http {
            findings.push(self.http().await);
        }
        if all || mode == ReportMode::Resources {
            findings.push(self.resources(&container).await);
        }
        if all || mode == ReportMode::Logs {
            findings.push(self.logs(&container).await);
        }
        if all || mode == ReportMode::Load {
            findings.push(self.load().await);
        }
        if all {
            findings.push(self.metrics().await);
        }

        Ok(HealthReport {
            environment: self.settings.environment.clone(),
            active,
            findings,
        })
    }

    fn probe(&self) -> HealthProbe<'_, R, H> {
        HealthProbe::new(self.runtime, self.http, self.settings.health.request_timeout)
    }

    async fn container(&self, container: &ContainerId) -> Vec<Finding> {
        let health = self.probe().runtime_health(container).await;
        let mut findings = vec![Finding::new(
            "container",
            health == RuntimeHealth::Healthy,
            format!("{} is {}", container, health),
        )];

        // Run the healthcheck ourselves: some runtimes never schedule it.
        if let Some(command) = self.settings.slots.healthcheck.test.get(1) {
            let finding = match self.runtime.exec(container, &ExecConfig::shell(command)).await {
                Ok(result) if result.exit_code == 0 => {
                    Finding::new("healthcheck", true, "check command exited 0")
                }
                Ok(result) => Finding::new(
                    "healthcheck",
                    false,
                    format!(
                        "check command exited {}: {}",
                        result.exit_code,
                        String::from_utf8_lossy(&result.stderr).trim()
                    ),
                ),
                Err(e) => Finding::new("healthcheck", false, e.to_string()),
            };
            findings.push(finding);
        }
        findings
    }

    async fn http(&self) -> Finding {
        let port = self.settings.slots.production_port;
        let result = self.probe().http_get(port, &self.settings.health.path).await;
        match result {
            Ok(resp) => Finding::new(
                "http",
                resp.is_success(),
                format!("GET {} returned {}", self.settings.health.path, resp.status),
            ),
            Err(e) => Finding::new("http", false, e.to_string()),
        }
    }

    async fn resources(&self, container: &ContainerId) -> Finding {
        match self.runtime.stats(container).await {
            Ok(usage) => {
                let memory = usage.memory_percent();
                let detail = match memory {
                    Some(pct) => format!(
                        "cpu {:.1}%, memory {} bytes ({:.1}% of limit)",
                        usage.cpu_percent, usage.memory_bytes, pct
                    ),
                    None => format!(
                        "cpu {:.1}%, memory {} bytes (no limit)",
                        usage.cpu_percent, usage.memory_bytes
                    ),
                };
                let passed = memory.is_none_or(|pct| pct < MEMORY_FAIL_PERCENT);
                Finding::new("resources", passed, detail)
            }
            Err(e) => Finding::new("resources", false, e.to_string()),
        }
    }

    async fn logs(&self, container: &ContainerId) -> Finding {
        let lines = self.settings.health.log_lines;
        match self.runtime.tail_logs(container, lines).await {
            Ok(tail) => {
                let errors = count_error_lines(tail.iter().map(|l| l.content.as_str()));
                let threshold = self.settings.health.error_threshold;
                Finding::new(
                    "logs",
                    errors <= threshold,
                    format!(
                        "{} error lines in the last {} (threshold {})",
                        errors, lines, threshold
                    ),
                )
            }
            Err(e) => Finding::new("logs", false, e.to_string()),
        }
    }

    async fn load(&self) -> Finding {
        let requests = self.settings.health.load_requests.max(1);
        let port = self.settings.slots.production_port;
        let probe = self.probe();
        let mut ok = 0u32;
        for _ in 0..requests {
            if let Ok(resp) = probe.http_get(port, &self.settings.health.path).await
                && resp.is_success()
            {
                ok += 1;
            }
        }
        let ratio = f64::from(ok) / f64::from(requests);
        Finding::new(
            "load",
            ratio >= self.settings.health.min_success_ratio,
            format!(
                "{}/{} requests succeeded (minimum {:.0}%)",
                ok,
                requests,
                self.settings.health.min_success_ratio * 100.0
            ),
        )
    }

    async fn metrics(&self) -> Finding {
        let path = &self.settings.health.metrics_path;
        let result = self
            .probe()
            .http_get(self.settings.slots.production_port, path)
            .await;
        match result {
            Ok(resp) if resp.is_success() => Finding::info(
                "metrics",
                true,
                format!("{} served {} bytes", path, resp.body.len()),
            ),
            Ok(resp) => Finding::info("metrics", false, format!("{} returned {}", path, resp.status)),
            Err(e) => Finding::info("metrics", false, e.to_string()),
        }
    }
}

/// Lines mentioning an error or panic, case-insensitively.
pub fn count_error_lines<'l>(lines: impl Iterator<Item = &'l str>) -> usize {
    lines
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            lower.contains("error") || lower.contains("panic") || lower.contains("fatal")
        })
        .count()
}
