// ABOUTME: SSH control channel to the target host.
// ABOUTME: Command execution, runtime socket forwarding, and TCP tunnels for probes.

mod client;
mod error;
mod forward;

pub use client::{CommandOutput, Session, SessionConfig, TcpTunnel};
pub use error::{Error, Result};
pub use forward::ForwardHandle;
