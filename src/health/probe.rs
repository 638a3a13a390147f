// ABOUTME: Bounded, read-only verification of a slot: runtime health and HTTP health.
// ABOUTME: Polls under a BackoffPolicy and fails with HealthTimeout when the budget runs out.

use super::http::{HttpError, HttpResponse, HttpTransport};
use super::policy::{BackoffPolicy, Exhausted};
use crate::runtime::{ContainerOps, ContainerState, HealthState};
use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Health as seen through a single inspect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Starting,
    Healthy,
    Unhealthy,
    Unknown,
    NotFound,
}

impl fmt::Display for RuntimeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeHealth::Starting => "starting",
            RuntimeHealth::Healthy => "healthy",
            RuntimeHealth::Unhealthy => "unhealthy",
            RuntimeHealth::Unknown => "unknown",
            RuntimeHealth::NotFound => "not found",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Runtime,
    Http,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckKind::Runtime => "runtime",
            CheckKind::Http => "http",
        })
    }
}

#[derive(Debug, Error)]
#[error("{check} health of {target} not reached after {attempts} attempts in {elapsed:?} (last: {last})")]
pub struct HealthTimeout {
    pub check: CheckKind,
    pub target: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub last: String,
}

/// One combined probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub timestamp: DateTime<Utc>,
    pub runtime: RuntimeHealth,
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.runtime == RuntimeHealth::Healthy
            && self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

pub struct HealthProbe<'a, R: ContainerOps + ?Sized, H: HttpTransport + ?Sized> {
    runtime: &'a R,
    http: &'a H,
    request_timeout: Duration,
}

impl<'a, R: ContainerOps + ?Sized, H: HttpTransport + ?Sized> HealthProbe<'a, R, H> {
    pub fn new(runtime: &'a R, http: &'a H, request_timeout: Duration) -> Self {
        Self {
            runtime,
            http,
            request_timeout,
        }
    }

    pub async fn runtime_health(&self, container: &ContainerId) -> RuntimeHealth {
        let info = match self.runtime.inspect_container(container).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return RuntimeHealth::NotFound,
            Err(e) => {
                tracing::debug!(%container, "inspect failed: {}", e);
                return RuntimeHealth::Unknown;
            }
        };
        match info.state {
            ContainerState::Running => match info.health {
                Some(HealthState::Healthy) => RuntimeHealth::Healthy,
                Some(HealthState::Unhealthy) => RuntimeHealth::Unhealthy,
                Some(HealthState::Starting) => RuntimeHealth::Starting,
                Some(HealthState::None) | None => RuntimeHealth::Unknown,
            },
            ContainerState::Created | ContainerState::Restarting => RuntimeHealth::Starting,
            ContainerState::Exited | ContainerState::Dead | ContainerState::Removing => {
                RuntimeHealth::Unhealthy
            }
            ContainerState::Paused => RuntimeHealth::Unknown,
        }
    }

    /// Poll until the runtime reports `Healthy`. No other state ends the poll early.
    pub async fn await_healthy(
        &self,
        container: &ContainerId,
        policy: &BackoffPolicy,
    ) -> Result<(), HealthTimeout> {
        let last = Mutex::new(RuntimeHealth::Unknown);
        let outcome = policy
            .poll(|attempt| {
                let last = &last;
                async move {
                    let health = self.runtime_health(container).await;
                    tracing::debug!(%container, attempt, %health, "runtime health");
                    *last.lock() = health;
                    (health == RuntimeHealth::Healthy).then_some(())
                }
            })
            .await;
        outcome.map_err(|exhausted| {
            timeout(CheckKind::Runtime, container.to_string(), exhausted, last.into_inner().to_string())
        })
    }

    /// One bounded GET.
    pub async fn http_get(&self, port: u16, path: &str) -> Result<HttpResponse, HttpError> {
        match tokio::time::timeout(self.request_timeout, self.http.get(port, path)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Request(format!(
                "no response within {:?}",
                self.request_timeout
            ))),
        }
    }

    /// Poll until one request returns 2xx.
    pub async fn http_healthy(
        &self,
        port: u16,
        path: &str,
        policy: &BackoffPolicy,
    ) -> Result<(), HealthTimeout> {
        let last = Mutex::new(String::from("no response"));
        let outcome = policy
            .poll(|attempt| {
                let last = &last;
                async move {
                    match self.http_get(port, path).await {
                        Ok(resp) if resp.is_success() => Some(()),
                        Ok(resp) => {
                            tracing::debug!(port, attempt, status = resp.status, "http probe");
                            *last.lock() = format!("status {}", resp.status);
                            None
                        }
                        Err(e) => {
                            tracing::debug!(port, attempt, "http probe: {}", e);
                            *last.lock() = e.to_string();
                            None
                        }
                    }
                }
            })
            .await;
        outcome.map_err(|exhausted| {
            timeout(
                CheckKind::Http,
                format!("127.0.0.1:{}{}", port, path),
                exhausted,
                last.into_inner(),
            )
        })
    }

    /// Inspect once and GET once, timing the request.
    pub async fn check(&self, container: &ContainerId, port: u16, path: &str) -> HealthCheckResult {
        let runtime = self.runtime_health(container).await;
        let started = Instant::now();
        let (status, error) = match self.http_get(port, path).await {
            Ok(resp) => (Some(resp.status), None),
            Err(e) => (None, Some(e.to_string())),
        };
        HealthCheckResult {
            timestamp: Utc::now(),
            runtime,
            status,
            latency: started.elapsed(),
            error,
        }
    }
}

fn timeout(check: CheckKind, target: String, exhausted: Exhausted, last: String) -> HealthTimeout {
    HealthTimeout {
        check,
        target,
        attempts: exhausted.attempts,
        elapsed: exhausted.elapsed,
        last,
    }
}
