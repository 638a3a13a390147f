// ABOUTME: Runtime detection on the target host.
// ABOUTME: Checks for Podman sockets first, then Docker, unless configured.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use crate::shell::{RemoteShell, ShellError, quote};

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Find the runtime socket on the target.
///
/// An explicit `runtime` in `config` wins. Otherwise the order is rootless
/// Podman, rootful Podman, then Docker.
pub async fn detect_runtime<S>(
    shell: &S,
    config: Option<&RuntimeConfig>,
) -> Result<RuntimeInfo, DetectionError>
where
    S: RemoteShell + ?Sized,
{
    if let Some(cfg) = config
        && let Some(runtime_type) = cfg.runtime
    {
        let socket_path = cfg
            .socket
            .clone()
            .unwrap_or_else(|| default_socket_path(runtime_type).to_string());
        return Ok(RuntimeInfo {
            runtime_type,
            socket_path,
        });
    }

    let uid = shell.run("id -u").await?;
    let mut candidates = Vec::with_capacity(3);
    if uid.success() {
        candidates.push((
            RuntimeType::Podman,
            format!("/run/user/{}/podman/podman.sock", uid.stdout.trim()),
        ));
    }
    candidates.push((RuntimeType::Podman, ROOTFUL_PODMAN.to_string()));
    candidates.push((RuntimeType::Docker, DOCKER_SOCKET.to_string()));

    for (runtime_type, socket_path) in candidates {
        if shell.run(&format!("test -S {}", quote(&socket_path))).await?.success() {
            tracing::debug!(%runtime_type, %socket_path, "detected runtime");
            return Ok(RuntimeInfo {
                runtime_type,
                socket_path,
            });
        }
    }

    Err(DetectionError::NoRuntimeFound)
}

fn default_socket_path(runtime: RuntimeType) -> &'static str {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET,
        RuntimeType::Podman => ROOTFUL_PODMAN,
    }
}
