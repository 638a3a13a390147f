// ABOUTME: Backup kinds and records, with the timestamped file naming scheme.
// ABOUTME: A record's creation time is always parsed back from its file name.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Data,
    Config,
    Database,
    Image,
    Full,
}

impl BackupKind {
    pub const ALL: [BackupKind; 5] = [
        BackupKind::Data,
        BackupKind::Config,
        BackupKind::Database,
        BackupKind::Image,
        BackupKind::Full,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Data => "data",
            BackupKind::Config => "config",
            BackupKind::Database => "database",
            BackupKind::Image => "image",
            BackupKind::Full => "full",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            BackupKind::Database => "sql.gz",
            _ => "tar.gz",
        }
    }

    /// Whether the archive is a tarball, not just a gzip stream.
    pub fn is_tar(self) -> bool {
        self.extension().starts_with("tar")
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackupKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown backup kind {:?} (data, config, database, image, full)", s))
    }
}

/// `<kind>-<YYYYmmdd-HHMMSS>.<ext>`
pub fn file_name(kind: BackupKind, at: DateTime<Utc>) -> String {
    numbered_file_name(kind, at, 1)
}

/// The `n`-th name for a backup taken within one second: the first is
/// `file_name`, later ones carry `-<n>` after the timestamp.
pub fn numbered_file_name(kind: BackupKind, at: DateTime<Utc>, n: u32) -> String {
    let stamp = at.format(TIMESTAMP_FORMAT);
    if n <= 1 {
        format!("{}-{}.{}", kind, stamp, kind.extension())
    } else {
        format!("{}-{}-{}.{}", kind, stamp, n, kind.extension())
    }
}

/// Inverse of `file_name`; `None` for files slotctl did not write.
pub fn parse_file_name(name: &str) -> Option<(BackupKind, DateTime<Utc>)> {
    parse_numbered(name).map(|(kind, at, _)| (kind, at))
}

fn parse_numbered(name: &str) -> Option<(BackupKind, DateTime<Utc>, u32)> {
    let (kind, rest) = name.split_once('-')?;
    let kind: BackupKind = kind.parse().ok()?;
    let stem = rest.strip_suffix(kind.extension())?.strip_suffix('.')?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT) {
        return Some((kind, naive.and_utc(), 1));
    }
    let (stamp, n) = stem.rsplit_once('-')?;
    if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) || n.starts_with('0') {
        return None;
    }
    let n: u32 = n.parse().ok().filter(|n| *n >= 2)?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((kind, naive.and_utc(), n))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub kind: BackupKind,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub verified: bool,
}

impl BackupRecord {
    /// Build a record from a listed file, unverified.
    pub fn from_listing(dir: &str, name: &str, size: u64) -> Option<Self> {
        let (kind, created_at) = parse_file_name(name)?;
        Some(Self {
            kind,
            path: format!("{}/{}", dir.trim_end_matches('/'), name),
            created_at,
            size,
            verified: false,
        })
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Position among backups of the same second; 1 for the first.
    pub fn sequence(&self) -> u32 {
        parse_numbered(self.file_name()).map_or(1, |(_, _, n)| n)
    }
}
