// ABOUTME: Point-in-time backups of a slot's data, config, database and image.
// ABOUTME: Records, retention planning, the storage seam, and BackupManager.

mod manager;
mod record;
mod retention;
mod store;

pub use manager::BackupManager;
pub use record::{BackupKind, BackupRecord, file_name, numbered_file_name, parse_file_name};
pub use retention::RetentionPolicy;
pub use store::{BackupSource, BackupStore, ListedFile, ShellBackupStore};

use crate::error::ErrorKind;
use crate::shell::ShellError;
use crate::slot::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot back up {kind}: {reason}")]
    NotConfigured { kind: BackupKind, reason: String },

    #[error("backup {path} failed integrity verification")]
    Integrity { path: String },

    #[error("no {0} backup found")]
    NotFound(BackupKind),

    #[error("cannot list {dir}: {reason}")]
    Listing { dir: String, reason: String },

    #[error("backup command failed: {0}")]
    Shell(#[from] ShellError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Integrity { .. } => ErrorKind::Integrity,
            BackupError::NotConfigured { .. } => ErrorKind::Config,
            BackupError::State(_) => ErrorKind::State,
            BackupError::Shell(ShellError::Ssh(_)) => ErrorKind::Connectivity,
            BackupError::NotFound(_) | BackupError::Listing { .. } | BackupError::Shell(_) => {
                ErrorKind::Step
            }
        }
    }
}
