// ABOUTME: Small durable records on the target host, keyed by relative path.
// ABOUTME: Leases, LastKnownGood and incident snapshots are stored through StateStore.

use crate::shell::{RemoteShell, ShellError, quote, quote_path};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store command failed: {0}")]
    Shell(#[from] ShellError),

    #[error("state record {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("cannot encode state record {key}: {reason}")]
    Encode { key: String, reason: String },
}

/// Key/value records. Keys are relative paths such as `known-good/prod.json`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when the record does not exist.
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Create or replace a record atomically.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Create a record only if absent. `false` means it already existed.
    async fn create_exclusive(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Remove a record; absent records are not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Exit status the read and create scripts use for "record exists/absent".
const MARKER_STATUS: u32 = 3;

/// Records as files under a directory on the target, written through a shell.
#[derive(Debug)]
pub struct ShellStateStore<S> {
    shell: S,
    root: String,
}

impl<S: RemoteShell> ShellStateStore<S> {
    pub fn new(shell: S, root: impl Into<String>) -> Self {
        Self {
            shell,
            root: root.into(),
        }
    }

    fn path(&self, key: &str) -> String {
        quote_path(&format!("{}/{}", self.root.trim_end_matches('/'), key))
    }

    fn parent(&self, key: &str) -> String {
        let full = format!("{}/{}", self.root.trim_end_matches('/'), key);
        match full.rsplit_once('/') {
            Some((dir, _)) => quote_path(dir),
            None => quote_path(&self.root),
        }
    }
}

#[async_trait]
impl<S: RemoteShell> StateStore for ShellStateStore<S> {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path(key);
        let output = self
            .shell
            .run(&format!(
                "if [ -e {p} ]; then cat {p}; else exit {code}; fi",
                p = path,
                code = MARKER_STATUS
            ))
            .await?;
        match output.exit_code {
            0 => Ok(Some(output.stdout)),
            MARKER_STATUS => Ok(None),
            exit_code => Err(ShellError::Failed {
                command: format!("read {}", key),
                exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key);
        self.shell
            .run_checked(&format!(
                "mkdir -p {dir} && printf '%s' {value} > {p}.tmp && mv -f {p}.tmp {p}",
                dir = self.parent(key),
                value = quote(value),
                p = path
            ))
            .await?;
        Ok(())
    }

    async fn create_exclusive(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        // noclobber makes the redirect fail when the file exists.
        let path = self.path(key);
        let output = self
            .shell
            .run(&format!(
                "mkdir -p {dir} && if (set -C; printf '%s' {value} > {p}) 2>/dev/null; \
                 then exit 0; elif [ -e {p} ]; then exit {code}; else exit 1; fi",
                dir = self.parent(key),
                value = quote(value),
                p = path,
                code = MARKER_STATUS
            ))
            .await?;
        match output.exit_code {
            0 => Ok(true),
            MARKER_STATUS => Ok(false),
            exit_code => Err(ShellError::Failed {
                command: format!("create {}", key),
                exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.shell
            .run_checked(&format!("rm -f {}", self.path(key)))
            .await?;
        Ok(())
    }
}
