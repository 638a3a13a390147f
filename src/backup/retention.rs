// ABOUTME: Retention planning for backups: age limit first, then a per-kind cap.
// ABOUTME: Pure over the record list, so pruning twice removes nothing the second time.

use super::record::{BackupKind, BackupRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_per_kind: usize,
}

impl RetentionPolicy {
    /// Records to delete, sorted by path.
    pub fn plan<'r>(&self, records: &'r [BackupRecord], now: DateTime<Utc>) -> Vec<&'r BackupRecord> {
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::TimeDelta::MAX);
        let mut doomed = Vec::new();
        let mut by_kind: BTreeMap<BackupKind, Vec<&BackupRecord>> = BTreeMap::new();

        for record in records {
            if now.signed_duration_since(record.created_at) > max_age {
                doomed.push(record);
            } else {
                by_kind.entry(record.kind).or_default().push(record);
            }
        }

        for (_, mut kept) in by_kind {
            kept.sort_by(|a, b| newest_first(a, b));
            doomed.extend(kept.into_iter().skip(self.max_per_kind));
        }

        doomed.sort_by(|a, b| a.path.cmp(&b.path));
        doomed
    }
}

/// Newest creation time first, then the later of same-second backups, then
/// file name (greatest first).
pub(crate) fn newest_first(a: &BackupRecord, b: &BackupRecord) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.sequence().cmp(&a.sequence()))
        .then_with(|| b.file_name().cmp(a.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::record::file_name;

    fn record(kind: BackupKind, days_ago: i64, now: DateTime<Utc>) -> BackupRecord {
        let at = now - chrono::Duration::days(days_ago);
        BackupRecord {
            kind,
            path: format!("/b/{}/{}", kind, file_name(kind, at)),
            created_at: at,
            size: 1,
            verified: false,
        }
    }

    #[test]
    fn age_then_count() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_age: Duration::from_secs(30 * 86_400),
            max_per_kind: 2,
        };
        let records = vec![
            record(BackupKind::Data, 40, now),
            record(BackupKind::Data, 3, now),
            record(BackupKind::Data, 2, now),
            record(BackupKind::Data, 1, now),
            record(BackupKind::Config, 1, now),
        ];

        let doomed = policy.plan(&records, now);
        let doomed: Vec<_> = doomed.iter().map(|r| r.created_at).collect();
        assert_eq!(doomed.len(), 2);
        assert!(doomed.contains(&records[0].created_at));
        assert!(doomed.contains(&records[1].created_at));
    }
}
