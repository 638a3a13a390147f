// ABOUTME: LastKnownGood record: the last slot and image confirmed healthy in production.
// ABOUTME: Written after a successful switch; read by rollback to pick its target.

use crate::state::{StateStore, StoreError};
use crate::types::{ImageRef, SlotColor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownGoodEntry {
    pub color: SlotColor,
    pub image: ImageRef,
    pub recorded_at: DateTime<Utc>,
}

/// The current confirmed pair and the one it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastKnownGood {
    pub current: KnownGoodEntry,
    #[serde(default)]
    pub previous: Option<KnownGoodEntry>,
}

impl LastKnownGood {
    /// Record a newly confirmed pair. Redeploying the same image keeps the
    /// older `previous` so rollback still has somewhere to go.
    pub fn advance(existing: Option<LastKnownGood>, color: SlotColor, image: ImageRef) -> Self {
        let current = KnownGoodEntry {
            color,
            image,
            recorded_at: Utc::now(),
        };
        let previous = match existing {
            Some(old) if old.current.image == current.image => old.previous,
            Some(old) => Some(old.current),
            None => None,
        };
        Self { current, previous }
    }

    /// The image rollback should restore, given what the active slot runs.
    pub fn rollback_image(&self, active_image: Option<&ImageRef>) -> Option<&ImageRef> {
        match active_image {
            Some(active) if *active == self.current.image => {
                self.previous.as_ref().map(|p| &p.image)
            }
            _ => Some(&self.current.image),
        }
    }
}

pub fn known_good_key(environment: &str) -> String {
    format!("known-good/{}.json", environment)
}

pub async fn load<S: StateStore + ?Sized>(
    store: &S,
    environment: &str,
) -> Result<Option<LastKnownGood>, StoreError> {
    let key = known_good_key(environment);
    match store.read(&key).await? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                key,
                reason: e.to_string(),
            }),
    }
}

/// Advance and persist the record for `environment`.
pub async fn record<S: StateStore + ?Sized>(
    store: &S,
    environment: &str,
    color: SlotColor,
    image: &ImageRef,
) -> Result<LastKnownGood, StoreError> {
    let key = known_good_key(environment);
    let existing = match load(store, environment).await {
        Ok(existing) => existing,
        Err(StoreError::Malformed { reason, .. }) => {
            tracing::warn!("replacing malformed LastKnownGood for {}: {}", environment, reason);
            None
        }
        Err(e) => return Err(e),
    };
    let updated = LastKnownGood::advance(existing, color, image.clone());
    let encoded = serde_json::to_string_pretty(&updated).map_err(|e| StoreError::Encode {
        key: key.clone(),
        reason: e.to_string(),
    })?;
    store.write(&key, &encoded).await?;
    tracing::info!(environment, %color, %image, "recorded LastKnownGood");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: &str) -> ImageRef {
        ImageRef::parse(&format!("ghcr.io/acme/shop:{}", tag)).unwrap()
    }

    #[test]
    fn advance_shifts_current_to_previous() {
        let first = LastKnownGood::advance(None, SlotColor::Blue, image("v1"));
        assert!(first.previous.is_none());

        let second = LastKnownGood::advance(Some(first), SlotColor::Green, image("v2"));
        assert_eq!(second.current.image, image("v2"));
        assert_eq!(second.previous.as_ref().unwrap().image, image("v1"));
        assert_eq!(second.previous.as_ref().unwrap().color, SlotColor::Blue);
    }

    #[test]
    fn redeploying_same_image_keeps_previous() {
        let first = LastKnownGood::advance(None, SlotColor::Blue, image("v1"));
        let second = LastKnownGood::advance(Some(first), SlotColor::Green, image("v2"));
        let third = LastKnownGood::advance(Some(second), SlotColor::Blue, image("v2"));
        assert_eq!(third.current.color, SlotColor::Blue);
        assert_eq!(third.previous.unwrap().image, image("v1"));
    }

    #[test]
    fn rollback_image_skips_what_is_running() {
        let lkg = LastKnownGood::advance(
            Some(LastKnownGood::advance(None, SlotColor::Blue, image("v1"))),
            SlotColor::Green,
            image("v2"),
        );
        assert_eq!(lkg.rollback_image(Some(&image("v2"))), Some(&image("v1")));
        assert_eq!(lkg.rollback_image(Some(&image("v3"))), Some(&image("v2")));
        assert_eq!(lkg.rollback_image(None), Some(&image("v2")));
    }
}
