// ABOUTME: Library root for slotctl - blue/green slot deployment with layered rollback.
// ABOUTME: The main binary is in main.rs; everything it drives is exposed here for tests.

pub mod backup;
pub mod config;
pub mod context;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod incident;
pub mod known_good;
pub mod lease;
pub mod output;
pub mod rollback;
pub mod runtime;
pub mod shell;
pub mod slot;
pub mod ssh;
pub mod state;
pub mod types;

pub use error::{Error, ErrorKind, Result};
