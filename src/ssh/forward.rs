// ABOUTME: Unix socket forwarding over SSH.
// ABOUTME: Exposes the target's runtime socket as a local socket for bollard.

use super::client::HostKeyCheck;
use super::error::{Error, Result};
use russh::client::Handle;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// A running forwarder. Stopping or dropping it removes the local socket.
pub struct ForwardHandle {
    local_path: PathBuf,
    task: JoinHandle<()>,
}

impl ForwardHandle {
    pub fn path(&self) -> &str {
        self.local_path.to_str().unwrap_or_default()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ForwardHandle {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.local_path);
    }
}

fn local_socket_path() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("slotctl-{}-{}.sock", std::process::id(), n))
}

pub(crate) async fn start(
    handle: Arc<Handle<HostKeyCheck>>,
    remote_socket: String,
) -> Result<ForwardHandle> {
    let local_path = local_socket_path();
    let _ = std::fs::remove_file(&local_path);

    let listener = UnixListener::bind(&local_path).map_err(|e| {
        Error::TunnelFailed(format!("cannot bind {}: {}", local_path.display(), e))
    })?;
    tracing::debug!(local = %local_path.display(), remote = %remote_socket, "forwarding socket");

    let task = tokio::spawn(accept_loop(listener, handle, remote_socket));
    Ok(ForwardHandle { local_path, task })
}

async fn accept_loop(
    listener: UnixListener,
    handle: Arc<Handle<HostKeyCheck>>,
    remote_socket: String,
) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::warn!("forwarded socket stopped accepting: {}", e);
                return;
            }
        };
        let handle = Arc::clone(&handle);
        let remote_socket = remote_socket.clone();
        tokio::spawn(async move {
            if let Err(e) = pipe(stream, &handle, &remote_socket).await {
                tracing::debug!("forwarded connection ended: {}", e);
            }
        });
    }
}

async fn pipe(
    mut local: UnixStream,
    handle: &Handle<HostKeyCheck>,
    remote_socket: &str,
) -> Result<()> {
    let channel = handle
        .channel_open_direct_streamlocal(remote_socket)
        .await
        .map_err(|e| Error::TunnelFailed(format!("{}: {}", remote_socket, e)))?;
    let mut remote = channel.into_stream();
    tokio::io::copy_bidirectional(&mut local, &mut remote).await?;
    Ok(())
}
