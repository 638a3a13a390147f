// ABOUTME: Per-environment lease serializing deploy, rollback and backup runs.
// ABOUTME: Created atomically in the state store; expired or unreadable leases are broken.

use crate::error::ErrorKind;
use crate::state::{StateStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error(
        "environment {environment} is leased by {owner} since {acquired_at} (use --force to break it)"
    )]
    Held {
        environment: String,
        owner: String,
        acquired_at: DateTime<Utc>,
    },

    #[error("lease for {0} was taken by another process while breaking it")]
    Contended(String),

    #[error("lease store failed: {0}")]
    Store(#[from] StoreError),
}

impl LeaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaseError::Held { .. } | LeaseError::Contended(_) => ErrorKind::Locked,
            LeaseError::Store(_) => ErrorKind::Step,
        }
    }
}

/// Who holds an environment, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub environment: String,
    /// `hostname:pid` of the holder.
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl LeaseInfo {
    pub fn new(environment: &str, ttl: Duration) -> Self {
        Self {
            environment: environment.to_string(),
            owner: format!(
                "{}:{}",
                gethostname::gethostname().to_string_lossy(),
                std::process::id()
            ),
            acquired_at: Utc::now(),
            ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::TimeDelta::MAX);
        now.signed_duration_since(self.acquired_at) > ttl
    }
}

pub fn lease_key(environment: &str) -> String {
    format!("{}.lease", environment)
}

/// A held lease. Call `release` when the run reaches a terminal state.
#[derive(Debug)]
pub struct Lease<'a, S: StateStore + ?Sized> {
    store: &'a S,
    info: LeaseInfo,
}

impl<'a, S: StateStore + ?Sized> Lease<'a, S> {
    /// Take the lease, breaking an expired or unreadable one, or a live one
    /// when `force` is set.
    pub async fn acquire(
        store: &'a S,
        environment: &str,
        ttl: Duration,
        force: bool,
    ) -> Result<Self, LeaseError> {
        let key = lease_key(environment);
        let info = LeaseInfo::new(environment, ttl);
        let encoded = serde_json::to_string(&info).map_err(|e| StoreError::Encode {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        if store.create_exclusive(&key, &encoded).await? {
            tracing::debug!(environment, owner = %info.owner, "lease acquired");
            return Ok(Self { store, info });
        }

        match store.read(&key).await? {
            // Released between our attempt and the read.
            None => {}
            Some(raw) => match serde_json::from_str::<LeaseInfo>(&raw) {
                Ok(existing) if force => {
                    tracing::warn!(
                        "breaking lease on {} held by {} since {}",
                        environment,
                        existing.owner,
                        existing.acquired_at
                    );
                }
                Ok(existing) if existing.is_expired(Utc::now()) => {
                    tracing::warn!(
                        "breaking expired lease on {} held by {} since {}",
                        environment,
                        existing.owner,
                        existing.acquired_at
                    );
                }
                Ok(existing) => {
                    return Err(LeaseError::Held {
                        environment: environment.to_string(),
                        owner: existing.owner,
                        acquired_at: existing.acquired_at,
                    });
                }
                Err(e) => {
                    tracing::warn!("lease on {} is unreadable ({}), breaking it", environment, e);
                }
            },
        }

        store.remove(&key).await?;
        if store.create_exclusive(&key, &encoded).await? {
            Ok(Self { store, info })
        } else {
            Err(LeaseError::Contended(environment.to_string()))
        }
    }

    pub fn info(&self) -> &LeaseInfo {
        &self.info
    }

    pub async fn release(self) -> Result<(), LeaseError> {
        self.store.remove(&lease_key(&self.info.environment)).await?;
        tracing::debug!(environment = %self.info.environment, "lease released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lease_is_not_expired() {
        let info = LeaseInfo::new("prod", Duration::from_secs(60));
        assert!(!info.is_expired(Utc::now()));
        assert!(info.owner.ends_with(&format!(":{}", std::process::id())));
    }

    #[test]
    fn lease_expires_after_ttl() {
        let mut info = LeaseInfo::new("prod", Duration::from_secs(60));
        info.acquired_at = Utc::now() - chrono::Duration::seconds(61);
        assert!(info.is_expired(Utc::now()));
    }

    #[test]
    fn lease_record_is_json_with_human_ttl() {
        let info = LeaseInfo::new("prod", Duration::from_secs(1800));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["ttl"], "30m");
        assert_eq!(json["environment"], "prod");
    }
}
