// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, command, and tunnel failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("authentication failed for user {0}: no key was accepted")]
    AuthenticationFailed(String),

    #[error("no usable SSH credentials: {0}")]
    NoCredentials(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("channel closed without an exit status")]
    ChannelClosed,

    #[error("tunnel failed: {0}")]
    TunnelFailed(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
