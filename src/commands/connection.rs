// ABOUTME: Opens the control channel for an environment: SSH session or local shell.
// ABOUTME: Detects and connects the runtime, then wires the stores and HTTP transport.

use slotctl::backup::ShellBackupStore;
use slotctl::config::{Settings, Target};
use slotctl::context::Context;
use slotctl::diagnostics::{Diagnostics, Warning};
use slotctl::error::Result;
use slotctl::health::{HttpTransport, LocalHttp, SshHttp};
use slotctl::lease::Lease;
use slotctl::output::Output;
use slotctl::runtime::{
    BollardRuntime, RuntimeError, RuntimeType, connect_local, connect_via_session, detect_runtime,
};
use slotctl::shell::{LocalShell, RemoteShell};
use slotctl::slot::slot_environment;
use slotctl::ssh::{Session, SessionConfig};
use slotctl::state::ShellStateStore;
use std::future::Future;
use std::sync::Arc;

type Shell = Arc<dyn RemoteShell>;

/// Everything a command needs on the target host.
pub struct Connection {
    session: Option<Arc<Session>>,
    shell: Shell,
    runtime: BollardRuntime,
    http: Arc<dyn HttpTransport>,
    store: ShellStateStore<Shell>,
    backups: ShellBackupStore<Shell>,
}

impl Connection {
    pub async fn open(settings: &Settings, output: &Output) -> Result<Self> {
        let (session, shell, http): (Option<Arc<Session>>, Shell, Arc<dyn HttpTransport>) =
            match &settings.connection.target {
                Target::Local => {
                    output.progress("  → Using local runtime...");
                    let shell: Shell = Arc::new(LocalShell);
                    let http: Arc<dyn HttpTransport> = Arc::new(LocalHttp);
                    (None, shell, http)
                }
                Target::Ssh { host, port } => {
                    output.progress(&format!("  → Connecting to {}...", host));
                    let session = Arc::new(Session::connect(session_config(settings, host, *port)).await?);
                    let shell: Shell = session.clone();
                    let http: Arc<dyn HttpTransport> = Arc::new(SshHttp::new(Arc::clone(&session)));
                    (Some(session), shell, http)
                }
            };

        output.progress("  → Detecting runtime...");
        let info = detect_runtime(shell.as_ref(), Some(&settings.runtime))
            .await
            .map_err(RuntimeError::from)?;
        output.progress(&format!("  → Found {} at {}", info.runtime_type, info.socket_path));

        let runtime = match &session {
            Some(session) => connect_via_session(session, &info).await?,
            None => connect_local(&info).await?,
        };

        Ok(Self {
            store: ShellStateStore::new(Arc::clone(&shell), settings.state_dir.clone()),
            backups: ShellBackupStore::new(Arc::clone(&shell)),
            session,
            shell,
            runtime,
            http,
        })
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime.runtime_type()
    }

    /// Build the shared context. Reads the env file when `with_env` is set.
    pub async fn context<'a>(
        &'a self,
        settings: &'a Settings,
        with_env: bool,
    ) -> Result<Context<'a, BollardRuntime, dyn HttpTransport, ShellStateStore<Shell>, ShellBackupStore<Shell>>>
    {
        let container_env = if with_env {
            slot_environment(self.shell.as_ref(), settings).await?
        } else {
            Default::default()
        };
        Ok(Context {
            runtime: &self.runtime,
            http: self.http.as_ref(),
            store: &self.store,
            backups: &self.backups,
            settings,
            runtime_type: self.runtime_type(),
            container_env,
        })
    }

    /// Run `body` while holding the environment lease. Release failures are
    /// warnings; the lease expires on its own.
    pub async fn leased<T, F, Fut>(
        &self,
        settings: &Settings,
        force: bool,
        diag: &mut Diagnostics,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lease = Lease::acquire(&self.store, &settings.environment, settings.lease_ttl, force).await?;
        tracing::info!(owner = %lease.info().owner, "holding lease on {}", settings.environment);
        let result = body().await;
        if let Err(e) = lease.release().await {
            diag.warn(Warning::lease_release(format!(
                "lease on {} not released (expires after {:?}): {}",
                settings.environment, settings.lease_ttl, e
            )));
        }
        result
    }

    /// Drop the runtime and stores, then end the SSH session.
    pub async fn close(self, diag: &mut Diagnostics) {
        let Connection {
            session,
            shell,
            runtime,
            http,
            store,
            backups,
        } = self;
        drop((shell, runtime, http, store, backups));

        let Some(session) = session else { return };
        let host = session.host().to_string();
        match Arc::try_unwrap(session) {
            Ok(session) => {
                if let Err(e) = session.disconnect().await {
                    diag.warn(Warning::ssh_disconnect(format!(
                        "SSH disconnect failed for {}: {}",
                        host, e
                    )));
                }
            }
            Err(_) => diag.warn(Warning::ssh_disconnect(format!(
                "SSH session to {} still in use, dropped without disconnect",
                host
            ))),
        }
    }
}

fn session_config(settings: &Settings, host: &str, port: u16) -> SessionConfig {
    let connection = &settings.connection;
    let config = SessionConfig::new(host, &connection.control_user)
        .port(port)
        .trust_on_first_use(connection.trust_first_connection);
    match &connection.ssh_key {
        Some(key) => config.key_path(key),
        None => config,
    }
}
