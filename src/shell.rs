// ABOUTME: Shell command execution on the target host, over SSH or locally.
// ABOUTME: Backups, state records, and runtime detection all run through RemoteShell.

use crate::ssh::{self, CommandOutput, Session};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Ssh(#[from] ssh::Error),

    #[error("failed to spawn local shell: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("`{command}` exited with {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: u32,
        stderr: String,
    },
}

/// Runs `sh -c` style command lines on the target host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError>;

    /// Run and require exit status 0, returning stdout.
    async fn run_checked(&self, command: &str) -> Result<String, ShellError> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ShellError::Failed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        Ok(self.exec(command).await?)
    }
}

#[async_trait]
impl<T: RemoteShell + ?Sized> RemoteShell for Arc<T> {
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        (**self).run(command).await
    }
}

/// `sh -c` on this machine, for `target_server: local`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

#[async_trait]
impl RemoteShell for LocalShell {
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        tracing::debug!(%command, "local exec");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await?;
        Ok(CommandOutput {
            // Killed by a signal: report the conventional shell status.
            exit_code: output
                .status
                .code()
                .and_then(|c| u32::try_from(c).ok())
                .unwrap_or(255),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Quote a value for interpolation into a POSIX shell command line.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Expand a leading `~/` against `$HOME`, leaving the rest quoted.
pub fn quote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("\"$HOME\"/{}", quote(rest)),
        None => quote(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("plain"), "'plain'");
    }

    #[test]
    fn quote_path_expands_home() {
        assert_eq!(quote_path("~/.local/state"), "\"$HOME\"/'.local/state'");
        assert_eq!(quote_path("/var/backups"), "'/var/backups'");
    }

    #[tokio::test]
    async fn local_shell_reports_exit_status() {
        let ok = LocalShell.run("echo hello").await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let err = LocalShell.run_checked("echo oops >&2; exit 3").await.unwrap_err();
        match err {
            ShellError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
