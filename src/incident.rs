// ABOUTME: Incident snapshots: slot tables, resource usage and log tails before and after.
// ABOUTME: Written to the state store on failures and around every rollback; never fatal.

use crate::runtime::Runtime;
use crate::slot::SlotResolver;
use crate::state::StateStore;
use crate::types::{SlotColor, SlotName};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Log lines kept per slot in a snapshot.
const LOG_TAIL: u64 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
    pub color: SlotColor,
    pub container: String,
    pub state: String,
    pub health: Option<String>,
    pub image: Option<String>,
    pub host_ports: Vec<u16>,
    pub rollback: bool,
    pub resources: Option<crate::runtime::ResourceUsage>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentSnapshot {
    pub environment: String,
    pub operation: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
    pub before: Vec<SlotReport>,
    pub after: Vec<SlotReport>,
}

/// `incidents/<env>-<timestamp>-<operation>.json`
pub fn incident_key(environment: &str, operation: &str, at: DateTime<Utc>) -> String {
    format!(
        "incidents/{}-{}-{}.json",
        environment,
        at.format("%Y%m%dT%H%M%S%.3fZ"),
        operation
    )
}

/// Describe both slots. Slots whose container is missing are left out;
/// inspection failures are logged and skipped.
pub async fn capture<R: Runtime + ?Sized>(runtime: &R, name: &SlotName) -> Vec<SlotReport> {
    let resolver = SlotResolver::new(runtime, name);
    let mut reports = Vec::new();
    for color in SlotColor::ALL {
        let slot = match resolver.describe(color).await {
            Ok(Some(slot)) => slot,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!(%color, "incident capture skipped slot: {}", e);
                continue;
            }
        };
        let resources = if slot.is_running() {
            runtime.stats(&slot.container).await.ok()
        } else {
            None
        };
        let logs = runtime
            .tail_logs(&slot.container, LOG_TAIL)
            .await
            .map(|lines| lines.into_iter().map(|l| l.content).collect())
            .unwrap_or_default();
        reports.push(SlotReport {
            color,
            container: slot.container.to_string(),
            state: slot.state.as_str().to_string(),
            health: slot.health.map(|h| format!("{:?}", h).to_lowercase()),
            image: slot.image.as_ref().map(ToString::to_string),
            host_ports: slot.host_ports.clone(),
            rollback: slot.is_rollback(),
            resources,
            logs,
        });
    }
    reports
}

/// Capture the post-state and persist the snapshot. Returns the record key,
/// or `None` when it could not be written.
pub async fn record<R: Runtime + ?Sized, S: StateStore + ?Sized>(
    runtime: &R,
    store: &S,
    name: &SlotName,
    environment: &str,
    operation: &str,
    before: Vec<SlotReport>,
    outcome: &str,
) -> Option<String> {
    let snapshot = IncidentSnapshot {
        environment: environment.to_string(),
        operation: operation.to_string(),
        outcome: outcome.to_string(),
        timestamp: Utc::now(),
        before,
        after: capture(runtime, name).await,
    };
    let key = incident_key(environment, operation, snapshot.timestamp);
    let encoded = match serde_json::to_string_pretty(&snapshot) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!("cannot encode incident snapshot: {}", e);
            return None;
        }
    };
    match store.write(&key, &encoded).await {
        Ok(()) => {
            tracing::info!(%key, operation, "incident snapshot written");
            Some(key)
        }
        Err(e) => {
            tracing::warn!("cannot write incident snapshot {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn incident_key_is_sortable_by_time() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            incident_key("prod", "deploy", at),
            "incidents/prod-20260102T030405.000Z-deploy.json"
        );
    }

    #[test]
    fn tiers_of_one_rollback_get_distinct_keys() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_ne!(
            incident_key("prod", "rollback-container", at),
            incident_key("prod", "rollback-backup", at)
        );
    }
}
