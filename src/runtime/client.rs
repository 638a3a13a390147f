// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Talks to Docker or Podman through a local or SSH-forwarded API socket.

use super::error::RuntimeError;
use super::traits::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult, HealthState, ImageError,
    ImageOps, ImageSummary, LogError, LogLine, LogOps, LogStream, ResourceUsage, StatsError,
    StatsOps,
};
use super::types::{RuntimeInfo, RuntimeType};
use crate::ssh::Session;
use crate::types::{ContainerId, ImageId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, ContainerStatsResponse, HealthConfig,
    HealthStatusEnum, HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    ListImagesOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    StopContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

const API_TIMEOUT_SECS: u64 = 120;

fn status_code(e: &BollardError) -> Option<u16> {
    match e {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn server_message(e: &BollardError) -> String {
    match e {
        BollardError::DockerResponseServerError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn map_container_error(e: BollardError) -> ContainerError {
    match status_code(&e) {
        Some(404) => ContainerError::NotFound(server_message(&e)),
        Some(409) => ContainerError::AlreadyExists(server_message(&e)),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_create_error(e: BollardError) -> ContainerError {
    match status_code(&e) {
        Some(404) => ContainerError::ImageNotFound(server_message(&e)),
        _ => map_container_error(e),
    }
}

fn map_exec_error(e: BollardError) -> ExecError {
    match status_code(&e) {
        Some(404) => ExecError::ContainerNotFound(server_message(&e)),
        Some(409) => ExecError::ContainerNotRunning(server_message(&e)),
        _ => ExecError::Runtime(e.to_string()),
    }
}

/// Container runtime driven through bollard.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl std::fmt::Debug for BollardRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BollardRuntime")
            .field("runtime_type", &self.runtime_type)
            .finish()
    }
}

impl BollardRuntime {
    async fn connect_socket(
        socket: &str,
        runtime_type: RuntimeType,
    ) -> Result<Self, RuntimeError> {
        let connection_error = |reason: String| RuntimeError::Connection {
            socket: socket.to_string(),
            reason,
        };
        let client = Docker::connect_with_unix(socket, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            .map_err(|e| connection_error(e.to_string()))?;
        client
            .ping()
            .await
            .map_err(|e| connection_error(e.to_string()))?;
        Ok(Self {
            client,
            runtime_type,
        })
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// Podman's attached exec streams may never close; run detached and poll.
    async fn exec_detached(&self, exec_id: &str) -> Result<ExecResult, ExecError> {
        self.client
            .start_exec(
                exec_id,
                Some(StartExecOptions {
                    detach: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_exec_error)?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
        loop {
            let details = self
                .client
                .inspect_exec(exec_id)
                .await
                .map_err(map_exec_error)?;
            if !details.running.unwrap_or(false) {
                return Ok(ExecResult {
                    exit_code: details.exit_code.unwrap_or(0),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ExecError::Failed("exec did not finish within 300s".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Forward the target's runtime socket over SSH and connect to it.
pub async fn connect_via_session(
    session: &Session,
    info: &RuntimeInfo,
) -> Result<BollardRuntime, RuntimeError> {
    let local_socket = session
        .forward_socket(&info.socket_path)
        .await
        .map_err(|e| RuntimeError::Connection {
            socket: info.socket_path.clone(),
            reason: e.to_string(),
        })?;
    BollardRuntime::connect_socket(&local_socket, info.runtime_type).await
}

/// Connect to a runtime socket on this machine.
pub async fn connect_local(info: &RuntimeInfo) -> Result<BollardRuntime, RuntimeError> {
    BollardRuntime::connect_socket(&info.socket_path, info.runtime_type).await
}

fn port_key(container_port: u16) -> String {
    format!("{}/tcp", container_port)
}

fn create_body(config: &ContainerConfig) -> ContainerCreateBody {
    let mounts: Vec<Mount> = config
        .volumes
        .iter()
        .map(|m| Mount {
            source: Some(m.source.clone()),
            target: Some(m.target.clone()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(m.read_only),
            ..Default::default()
        })
        .collect();

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for port in &config.ports {
        port_bindings
            .entry(port_key(port.container_port))
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: Some(port.host_port.to_string()),
            });
    }
    let exposed_ports: Vec<String> = port_bindings.keys().cloned().collect();

    let host_config = HostConfig {
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        }),
        mounts: (!mounts.is_empty()).then_some(mounts),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        ..Default::default()
    };

    let healthcheck = config.healthcheck.as_ref().map(|hc| HealthConfig {
        test: Some(hc.test.clone()),
        interval: Some(hc.interval.as_nanos() as i64),
        timeout: Some(hc.timeout.as_nanos() as i64),
        retries: Some(i64::from(hc.retries)),
        start_period: Some(hc.start_period.as_nanos() as i64),
        start_interval: None,
    });

    let env: Vec<String> = config
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    ContainerCreateBody {
        image: Some(config.image.to_string()),
        env: (!env.is_empty()).then_some(env),
        labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
        host_config: Some(host_config),
        healthcheck,
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        stop_timeout: config.stop_timeout.map(|d| d.as_secs() as i64),
        ..Default::default()
    }
}

fn parse_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
        Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
        _ => ContainerState::Exited,
    }
}

fn parse_health(status: HealthStatusEnum) -> HealthState {
    match status {
        HealthStatusEnum::STARTING => HealthState::Starting,
        HealthStatusEnum::HEALTHY => HealthState::Healthy,
        HealthStatusEnum::UNHEALTHY => HealthState::Unhealthy,
        _ => HealthState::None,
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };
        tracing::debug!(name = %config.name, image = %config.image, "create container");
        let response = self
            .client
            .create_container(Some(opts), create_body(config))
            .await
            .map_err(map_create_error)?;
        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        match self
            .client
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(304) => {
                Err(ContainerError::AlreadyRunning(id.to_string()))
            }
            Err(e) => Err(map_container_error(e)),
        }
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };
        match self.client.stop_container(id.as_str(), Some(opts)).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(304) => Err(ContainerError::NotRunning(id.to_string())),
            Err(e) => Err(map_container_error(e)),
        }
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_error)
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_error)?;

        let state = details.state.as_ref();
        let host_ports = details
            .host_config
            .as_ref()
            .and_then(|hc| hc.port_bindings.as_ref())
            .map(|bindings| {
                bindings
                    .values()
                    .flatten()
                    .flatten()
                    .filter_map(|b| b.host_port.as_deref()?.parse::<u16>().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ContainerInfo {
            id: ContainerId::new(details.id.unwrap_or_else(|| id.to_string())),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            state: parse_state(state.and_then(|s| s.status)),
            health: state
                .and_then(|s| s.health.as_ref())
                .and_then(|h| h.status)
                .map(parse_health),
            created: details.created.map(|dt| dt.to_string()).unwrap_or_default(),
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
            host_ports,
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(name) = &filters.name {
            filter_map.insert("name".to_string(), vec![name.clone()]);
        }
        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }
        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        // Podman reports transient `stopping`/`stopped` states that bollard
        // fails to deserialize; they clear within a second.
        let mut attempt = 0;
        let containers = loop {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => break containers,
                Err(e) => {
                    let message = e.to_string();
                    let transient = message.contains("unknown variant `stopping`")
                        || message.contains("unknown variant `stopped`");
                    attempt += 1;
                    if !transient || attempt >= 3 {
                        return Err(ContainerError::Runtime(message));
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        };

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c
                    .state
                    .map(|s| ContainerState::parse(&format!("{:?}", s)))
                    .unwrap_or(ContainerState::Exited),
                status: c.status.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();
        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        let mut progress = self.client.create_image(Some(opts), None, None);
        while let Some(update) = progress.next().await {
            update.map_err(|e| ImageError::PullFailed(format!("{}: {}", image_name, e)))?;
        }
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        match self.client.inspect_image(&reference.to_string()).await {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(ImageError::Runtime(e.to_string())),
        }
    }

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageSummary>, ImageError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![repository.to_string()]);
        let opts = ListImagesOptions {
            filters: Some(filters),
            ..Default::default()
        };
        let images = self
            .client
            .list_images(Some(opts))
            .await
            .map_err(|e| ImageError::Runtime(e.to_string()))?;

        Ok(images
            .into_iter()
            .map(|image| ImageSummary {
                id: ImageId::new(image.id),
                tags: image.repo_tags,
                created: image.created,
            })
            .collect())
    }
}

#[async_trait]
impl ExecOps for BollardRuntime {
    async fn exec(
        &self,
        container: &ContainerId,
        config: &ExecConfig,
    ) -> Result<ExecResult, ExecError> {
        let opts = bollard::models::ExecConfig {
            cmd: Some(config.cmd.clone()),
            env: (!config.env.is_empty()).then(|| config.env.clone()),
            user: config.user.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec_id = self
            .client
            .create_exec(container.as_str(), opts)
            .await
            .map_err(map_exec_error)?
            .id;

        if self.runtime_type == RuntimeType::Podman {
            return self.exec_detached(&exec_id).await;
        }

        let started = self
            .client
            .start_exec(&exec_id, None::<StartExecOptions>)
            .await
            .map_err(map_exec_error)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(item) = output.next().await {
                match item.map_err(|e| ExecError::Failed(e.to_string()))? {
                    LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    _ => {}
                }
            }
        }

        let details = self
            .client
            .inspect_exec(&exec_id)
            .await
            .map_err(map_exec_error)?;
        Ok(ExecResult {
            exit_code: details.exit_code.unwrap_or(0),
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn tail_logs(&self, id: &ContainerId, lines: u64) -> Result<Vec<LogLine>, LogError> {
        let opts = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            tail: lines.to_string(),
            ..Default::default()
        };

        let mut stream = self.client.logs(id.as_str(), Some(opts));
        let mut collected = Vec::new();
        while let Some(item) = stream.next().await {
            let output = item.map_err(|e| match status_code(&e) {
                Some(404) => LogError::ContainerNotFound(id.to_string()),
                _ => LogError::StreamError(e.to_string()),
            })?;
            let (stream, message) = match output {
                LogOutput::StdErr { message } => (LogStream::Stderr, message),
                LogOutput::StdOut { message }
                | LogOutput::StdIn { message }
                | LogOutput::Console { message } => (LogStream::Stdout, message),
            };
            let text = String::from_utf8_lossy(&message);
            collected.extend(text.lines().map(|line| LogLine {
                content: line.to_string(),
                stream,
            }));
        }
        Ok(collected)
    }
}

fn usage_from(stats: &ContainerStatsResponse) -> ResourceUsage {
    let total = |s: Option<&bollard::models::ContainerCpuStats>| {
        s.and_then(|c| c.cpu_usage.as_ref())
            .and_then(|u| u.total_usage)
            .unwrap_or(0)
    };
    let system = |s: Option<&bollard::models::ContainerCpuStats>| {
        s.and_then(|c| c.system_cpu_usage).unwrap_or(0)
    };

    let cpu = stats.cpu_stats.as_ref();
    let precpu = stats.precpu_stats.as_ref();
    let cpu_delta = total(cpu).saturating_sub(total(precpu)) as f64;
    let system_delta = system(cpu).saturating_sub(system(precpu)) as f64;
    let online_cpus = cpu.and_then(|c| c.online_cpus).unwrap_or(1).max(1) as f64;

    let cpu_percent = if system_delta > 0.0 {
        cpu_delta / system_delta * online_cpus * 100.0
    } else {
        0.0
    };

    let memory = stats.memory_stats.as_ref();
    ResourceUsage {
        cpu_percent,
        memory_bytes: memory.and_then(|m| m.usage).unwrap_or(0),
        memory_limit: memory.and_then(|m| m.limit).unwrap_or(0),
    }
}

#[async_trait]
impl StatsOps for BollardRuntime {
    async fn stats(&self, id: &ContainerId) -> Result<ResourceUsage, StatsError> {
        // one_shot would skip the second sample needed for a CPU delta.
        let opts = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut samples = self.client.stats(id.as_str(), Some(opts));
        match samples.next().await {
            Some(Ok(sample)) => Ok(usage_from(&sample)),
            Some(Err(e)) if status_code(&e) == Some(404) => {
                Err(StatsError::ContainerNotFound(id.to_string()))
            }
            Some(Err(e)) => Err(StatsError::Unavailable(e.to_string())),
            None => Err(StatsError::Unavailable("empty stats stream".to_string())),
        }
    }
}
