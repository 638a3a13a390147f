// ABOUTME: Application-wide error types for slotctl.
// ABOUTME: Module errors fold into Error; ErrorKind gives the operator-facing taxonomy.

use crate::backup::BackupError;
use crate::deploy::DeployFailure;
use crate::health::HealthTimeout;
use crate::lease::LeaseError;
use crate::rollback::RollbackError;
use crate::runtime::RuntimeError;
use crate::shell::ShellError;
use crate::slot::{EnvFileError, StateError};
use crate::state::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("control channel unreachable: {0}")]
    Connectivity(#[from] crate::ssh::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    #[error(transparent)]
    HealthTimeout(#[from] HealthTimeout),

    #[error(transparent)]
    Deploy(#[from] DeployFailure),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("health check failed: {0}")]
    HealthReport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Operator-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid required setting.
    Config,
    /// Control channel or runtime unreachable.
    Connectivity,
    /// No active slot, or both slots active.
    State,
    /// Bounded health polling exhausted.
    HealthTimeout,
    /// Backup verification failed.
    Integrity,
    /// Both rollback tiers failed.
    RollbackExhausted,
    /// Another invocation holds the environment.
    Locked,
    /// Any other step failure.
    Step,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::ConfigNotFound(_)
            | Error::AlreadyExists(_)
            | Error::UnknownEnvironment(_)
            | Error::MissingEnvVar(_)
            | Error::Yaml(_) => ErrorKind::Config,
            Error::Connectivity(_) | Error::Runtime(_) => ErrorKind::Connectivity,
            Error::State(StateError::Runtime(_)) => ErrorKind::Connectivity,
            Error::State(_) => ErrorKind::State,
            Error::EnvFile(_) => ErrorKind::Config,
            Error::HealthTimeout(_) => ErrorKind::HealthTimeout,
            Error::Deploy(failure) => failure.kind(),
            Error::Rollback(e) => e.kind(),
            Error::Backup(e) => e.kind(),
            Error::Lease(e) => e.kind(),
            Error::Shell(ShellError::Ssh(_)) => ErrorKind::Connectivity,
            Error::Shell(_)
            | Error::Store(_)
            | Error::HealthReport(_)
            | Error::Io(_) => ErrorKind::Step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotName;

    #[test]
    fn slot_state_errors_are_state_kind() {
        let name = SlotName::new("shop-prod").unwrap();
        assert_eq!(Error::from(StateError::NoActiveSlot(name.clone())).kind(), ErrorKind::State);
        assert_eq!(Error::from(StateError::Ambiguous(name)).kind(), ErrorKind::State);
    }

    #[test]
    fn configuration_errors_are_config_kind() {
        assert_eq!(Error::Config("bad".into()).kind(), ErrorKind::Config);
        assert_eq!(Error::MissingEnvVar("TOKEN".into()).kind(), ErrorKind::Config);
    }
}
