// ABOUTME: Per-environment settings: where the target is and how slots are named.
// ABOUTME: Parses target addresses like "local", "host", or "host:port".

use super::env_value::EnvValue;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// `host[:port]`, or `local` to act on this machine without SSH.
    pub target_server: String,
    pub control_user: String,
    pub slot_name: String,
    pub production_port: u16,
    pub container_port: u16,

    /// Env file on the target host, read at container creation.
    #[serde(default)]
    pub env_file: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub ssh_key: Option<PathBuf>,

    /// Accept and record an unknown host key on first connection.
    #[serde(default)]
    pub trust_first_connection: bool,
}

/// Where mutations run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Ssh { host: String, port: u16 },
}

impl Target {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("target_server cannot be empty".to_string());
        }
        if s.eq_ignore_ascii_case("local") {
            return Ok(Target::Local);
        }
        if s.contains('@') {
            return Err(format!(
                "target_server {:?} must not carry a user; set control_user instead",
                s
            ));
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port in target_server: {}", port))?;
                (host, port)
            }
            None => (s, 22),
        };
        if host.is_empty() {
            return Err("target_server hostname cannot be empty".to_string());
        }
        Ok(Target::Ssh {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => f.write_str("local"),
            Target::Ssh { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}
