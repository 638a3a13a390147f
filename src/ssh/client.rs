// ABOUTME: SSH session management using russh.
// ABOUTME: Connects as the control user, runs commands, and opens tunnels.

use super::error::{Error, Result};
use super::forward::{self, ForwardHandle};
use parking_lot::Mutex;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, ChannelStream, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

/// A byte stream to a TCP port on the target host, carried over SSH.
pub type TcpTunnel = ChannelStream<Msg>;

/// Connection parameters for the control channel.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Explicit private key. Without it the agent is tried, then ~/.ssh defaults.
    pub key_path: Option<PathBuf>,
    /// Accept and record unknown host keys.
    pub trust_on_first_use: bool,
    pub known_hosts_path: Option<PathBuf>,
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            command_timeout: Duration::from_secs(600),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Output of a remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// russh client handler: host key verification against known_hosts.
pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl HostKeyCheck {
    fn learn(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!("failed to record host key for {}: {}", self.host, e);
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            // A changed key is never accepted, even with trust-on-first-use.
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!("host key for {}:{} has changed", self.host, self.port);
                Ok(false)
            }
            Ok(false) | Err(_) if self.trust_on_first_use => {
                tracing::warn!(
                    "trust-on-first-use: accepting host key for {}:{}",
                    self.host,
                    self.port
                );
                self.learn(server_public_key);
                Ok(true)
            }
            Ok(false) | Err(_) => Ok(false),
        }
    }
}

enum Credentials {
    Agent(AgentClient<UnixStream>),
    Key(Arc<ssh_key::PrivateKey>),
}

/// An authenticated SSH session to the target host.
pub struct Session {
    config: SessionConfig,
    handle: Arc<Handle<HostKeyCheck>>,
    forwarders: Mutex<Vec<ForwardHandle>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("user", &self.config.user)
            .finish()
    }
}

impl Session {
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let credentials = Self::credentials(&config).await?;

        let russh_config = Arc::new(Config {
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let handler = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
        };

        tracing::debug!("connecting to {}@{}:{}", config.user, config.host, config.port);
        let mut handle = client::connect(russh_config, (config.host.as_str(), config.port), handler)
            .await
            .map_err(|e| Error::Connection {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            })?;

        if !Self::authenticate(&mut handle, &config.user, credentials).await? {
            return Err(Error::AuthenticationFailed(config.user.clone()));
        }

        Ok(Self {
            config,
            handle: Arc::new(handle),
            forwarders: Mutex::new(Vec::new()),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    async fn credentials(config: &SessionConfig) -> Result<Credentials> {
        if let Some(path) = &config.key_path {
            let key = load_secret_key(path, None).map_err(|e| Error::KeyLoadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(Credentials::Key(Arc::new(key)));
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(Credentials::Agent(agent));
        }

        let home = std::env::var("HOME")
            .map_err(|_| Error::NoCredentials("no SSH agent and HOME is not set".to_string()))?;
        ["id_ed25519", "id_ecdsa", "id_rsa"]
            .iter()
            .find_map(|name| load_secret_key(format!("{}/.ssh/{}", home, name), None).ok())
            .map(|key| Credentials::Key(Arc::new(key)))
            .ok_or_else(|| {
                Error::NoCredentials("no SSH agent and no default key in ~/.ssh".to_string())
            })
    }

    async fn authenticate(
        handle: &mut Handle<HostKeyCheck>,
        user: &str,
        credentials: Credentials,
    ) -> Result<bool> {
        match credentials {
            Credentials::Agent(mut agent) => {
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(|e| Error::NoCredentials(format!("agent refused listing: {}", e)))?;
                for identity in identities {
                    if let Ok(result) = handle
                        .authenticate_publickey_with(user, identity, None, &mut agent)
                        .await
                        && result.success()
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Credentials::Key(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;
                Ok(result.success())
            }
        }
    }

    /// Run a shell command on the target, bounded by the configured timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let timeout = self.config.command_timeout;
        tokio::time::timeout(timeout, self.exec_inner(command))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))?
    }

    async fn exec_inner(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(%command, "remote exec");
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to start command: {}", e)))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut eof = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Expose a remote Unix socket as a local one. Returns the local path.
    pub async fn forward_socket(&self, remote_socket: &str) -> Result<String> {
        let handle = forward::start(Arc::clone(&self.handle), remote_socket.to_string()).await?;
        let path = handle.path().to_string();
        self.forwarders.lock().push(handle);
        Ok(path)
    }

    /// Open a TCP stream to `127.0.0.1:<port>` as seen from the target host.
    pub async fn open_tcp(&self, port: u16) -> Result<TcpTunnel> {
        let channel = self
            .handle
            .channel_open_direct_tcpip("127.0.0.1", u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(|e| Error::TunnelFailed(format!("127.0.0.1:{}: {}", port, e)))?;
        Ok(channel.into_stream())
    }

    pub async fn disconnect(self) -> Result<()> {
        let forwarders: Vec<_> = self.forwarders.lock().drain(..).collect();
        for forwarder in forwarders {
            forwarder.stop();
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}
