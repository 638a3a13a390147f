// ABOUTME: Test support utilities.
// ABOUTME: In-memory runtime, HTTP, state store and backup store fakes plus shared settings.

// Each test binary only uses some of these helpers, so allow dead_code.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use slotctl::backup::{BackupError, BackupSource, BackupStore, ListedFile};
use slotctl::config::{Config, Settings};
use slotctl::context::Context;
use slotctl::health::{HttpError, HttpResponse, HttpTransport};
use slotctl::runtime::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult, HealthState, ImageError, ImageOps,
    ImageSummary, LogError, LogLine, LogOps, ResourceUsage, RuntimeType, StatsError, StatsOps,
};
use slotctl::slot::labels;
use slotctl::state::{StateStore, StoreError};
use slotctl::types::{ContainerId, ImageId, ImageRef, SlotColor};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("slotctl=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const REPOSITORY: &str = "ghcr.io/acme/shop";
pub const PRODUCTION_PORT: u16 = 8080;
pub const TEMP_PORT: u16 = 8081;

pub const CONFIG: &str = r#"
service: shop
image: ghcr.io/acme/shop
environments:
  production:
    target_server: local
    control_user: deploy
    slot_name: shop-prod
    production_port: 8080
    container_port: 3000
health:
  container: { max_attempts: 3, interval: 1s }
  http: { max_attempts: 3, interval: 1s }
  request_timeout: 1s
cleanup:
  grace_period: 0s
backup:
  directory: /backups
  data_dir: /srv/shop/data
"#;

pub fn settings() -> Settings {
    Config::from_yaml(CONFIG)
        .unwrap()
        .settings("production")
        .unwrap()
}

pub fn image(tag: &str) -> ImageRef {
    ImageRef::parse(&format!("{}:{}", REPOSITORY, tag)).unwrap()
}

pub fn container_name(color: SlotColor) -> String {
    format!("shop-prod-{}", color)
}

pub type TestContext<'a> = Context<'a, FakeRuntime, FakeRuntime, MemoryStateStore, FakeBackupStore>;

/// The fake runtime doubles as the HTTP transport: a port answers when a
/// running container publishes it.
pub fn context<'a>(
    runtime: &'a FakeRuntime,
    store: &'a MemoryStateStore,
    backups: &'a FakeBackupStore,
    settings: &'a Settings,
) -> TestContext<'a> {
    Context {
        runtime,
        http: runtime,
        store,
        backups,
        settings,
        runtime_type: RuntimeType::Docker,
        container_env: HashMap::new(),
    }
}

// =============================================================================
// Runtime
// =============================================================================

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub image: String,
    pub labels: HashMap<String, String>,
    pub host_ports: Vec<u16>,
    pub state: ContainerState,
    pub health: Option<HealthState>,
}

impl FakeContainer {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn is_rollback(&self) -> bool {
        self.labels.get(labels::ROLLBACK).map(String::as_str) == Some("true")
    }
}

#[derive(Default)]
struct RuntimeInner {
    containers: BTreeMap<String, FakeContainer>,
    /// Local images and their creation time.
    images: BTreeMap<String, i64>,
    next_created: i64,
    unhealthy: HashSet<String>,
    http_broken: HashSet<(String, u16)>,
    unpullable: HashSet<String>,
    logs: Vec<String>,
    usage: ResourceUsage,
    events: Vec<String>,
}

/// Containers keyed by name; a container's id is its name.
#[derive(Default)]
pub struct FakeRuntime {
    inner: Mutex<RuntimeInner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local image. Later calls are newer.
    pub fn add_image(&self, image: &ImageRef) {
        let mut inner = self.inner.lock();
        inner.next_created += 1;
        let created = inner.next_created;
        inner.images.insert(image.to_string(), created);
    }

    /// A slot container as a previous slotctl run would have left it.
    pub fn seed_slot(&self, color: SlotColor, image: &ImageRef, port: u16, running: bool, rollback: bool) {
        self.add_image(image);
        let mut labels = HashMap::new();
        labels.insert(labels::MANAGED.to_string(), "true".to_string());
        labels.insert(labels::SLOT.to_string(), color.to_string());
        labels.insert(labels::ENVIRONMENT.to_string(), "production".to_string());
        labels.insert(labels::VERSION.to_string(), image.to_string());
        labels.insert(labels::ROLLBACK.to_string(), rollback.to_string());
        let container = FakeContainer {
            image: image.to_string(),
            labels,
            host_ports: vec![port],
            state: if running {
                ContainerState::Running
            } else {
                ContainerState::Exited
            },
            health: running.then_some(HealthState::Healthy),
        };
        self.inner.lock().containers.insert(container_name(color), container);
    }

    pub fn set_label(&self, color: SlotColor, key: &str, value: &str) {
        if let Some(container) = self.inner.lock().containers.get_mut(&container_name(color)) {
            container.labels.insert(key.to_string(), value.to_string());
        }
    }

    /// Containers of `image` report unhealthy once started.
    pub fn mark_unhealthy(&self, image: &ImageRef) {
        self.inner.lock().unhealthy.insert(image.to_string());
    }

    /// Containers of `image` answer 503 on `port`.
    pub fn break_http(&self, image: &ImageRef, port: u16) {
        self.inner.lock().http_broken.insert((image.to_string(), port));
    }

    pub fn fail_pull(&self, image: &ImageRef) {
        self.inner.lock().unpullable.insert(image.to_string());
    }

    pub fn set_logs(&self, lines: &[&str]) {
        self.inner.lock().logs = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn set_usage(&self, usage: ResourceUsage) {
        self.inner.lock().usage = usage;
    }

    pub fn container(&self, color: SlotColor) -> Option<FakeContainer> {
        self.inner.lock().containers.get(&container_name(color)).cloned()
    }

    /// Names of running containers publishing `port`.
    pub fn running_on(&self, port: u16) -> Vec<String> {
        self.inner
            .lock()
            .containers
            .iter()
            .filter(|(_, c)| c.is_running() && c.host_ports.contains(&port))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().containers.len()
    }

    /// `op name` entries in call order.
    pub fn events(&self) -> Vec<String> {
        self.inner.lock().events.clone()
    }

    fn record(inner: &mut RuntimeInner, op: &str, subject: &str) {
        inner.events.push(format!("{} {}", op, subject));
    }
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(&self, config: &ContainerConfig) -> Result<ContainerId, ContainerError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, "create", &config.name);
        if inner.containers.contains_key(&config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }
        let image = config.image.to_string();
        if !inner.images.contains_key(&image) {
            return Err(ContainerError::ImageNotFound(image));
        }
        inner.containers.insert(
            config.name.clone(),
            FakeContainer {
                image,
                labels: config.labels.clone(),
                host_ports: config.ports.iter().map(|p| p.host_port).collect(),
                state: ContainerState::Created,
                health: None,
            },
        );
        Ok(ContainerId::new(config.name.clone()))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, "start", id.as_str());
        let container = inner
            .containers
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if container.is_running() {
            return Err(ContainerError::AlreadyRunning(id.to_string()));
        }
        let conflict = inner.containers.iter().any(|(name, other)| {
            name != id.as_str()
                && other.is_running()
                && other.host_ports.iter().any(|p| container.host_ports.contains(p))
        });
        if conflict {
            return Err(ContainerError::Runtime("port is already allocated".to_string()));
        }
        let health = if inner.unhealthy.contains(&container.image) {
            HealthState::Unhealthy
        } else {
            HealthState::Healthy
        };
        if let Some(c) = inner.containers.get_mut(id.as_str()) {
            c.state = ContainerState::Running;
            c.health = Some(health);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &ContainerId, _timeout: Duration) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, "stop", id.as_str());
        let container = inner
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if !container.is_running() {
            return Err(ContainerError::NotRunning(id.to_string()));
        }
        container.state = ContainerState::Exited;
        container.health = None;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, "remove", id.as_str());
        match inner.containers.get(id.as_str()) {
            None => Err(ContainerError::NotFound(id.to_string())),
            Some(c) if c.is_running() && !force => {
                Err(ContainerError::Runtime(format!("{} is running", id)))
            }
            Some(_) => {
                inner.containers.remove(id.as_str());
                Ok(())
            }
        }
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let inner = self.inner.lock();
        let c = inner
            .containers
            .get(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        Ok(ContainerInfo {
            id: id.clone(),
            name: id.to_string(),
            image: c.image.clone(),
            state: c.state,
            health: c.health,
            created: String::new(),
            labels: c.labels.clone(),
            host_ports: c.host_ports.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let inner = self.inner.lock();
        Ok(inner
            .containers
            .iter()
            .filter(|(_, c)| filters.all || c.is_running())
            .filter(|(_, c)| filters.labels.iter().all(|(k, v)| c.labels.get(k) == Some(v)))
            .map(|(name, c)| ContainerSummary {
                id: ContainerId::new(name.clone()),
                name: name.clone(),
                image: c.image.clone(),
                state: c.state,
                status: c.state.as_str().to_string(),
                labels: c.labels.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let key = reference.to_string();
        {
            let mut inner = self.inner.lock();
            Self::record(&mut inner, "pull", &key);
            if inner.unpullable.contains(&key) {
                return Err(ImageError::PullFailed(format!("{}: manifest unknown", key)));
            }
            if inner.images.contains_key(&key) {
                return Ok(());
            }
        }
        self.add_image(reference);
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        Ok(self.inner.lock().images.contains_key(&reference.to_string()))
    }

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageSummary>, ImageError> {
        let inner = self.inner.lock();
        Ok(inner
            .images
            .iter()
            .filter(|(reference, _)| {
                ImageRef::parse(reference).is_ok_and(|r| r.repository() == repository)
            })
            .map(|(reference, created)| ImageSummary {
                id: ImageId::new(format!("sha256:{:064}", created)),
                tags: vec![reference.clone()],
                created: *created,
            })
            .collect())
    }
}

#[async_trait]
impl ExecOps for FakeRuntime {
    async fn exec(&self, container: &ContainerId, _config: &ExecConfig) -> Result<ExecResult, ExecError> {
        let inner = self.inner.lock();
        match inner.containers.get(container.as_str()) {
            None => Err(ExecError::ContainerNotFound(container.to_string())),
            Some(c) if !c.is_running() => Err(ExecError::ContainerNotRunning(container.to_string())),
            Some(c) => Ok(ExecResult {
                exit_code: if c.health == Some(HealthState::Healthy) { 0 } else { 1 },
                stdout: Vec::new(),
                stderr: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn tail_logs(&self, id: &ContainerId, lines: u64) -> Result<Vec<LogLine>, LogError> {
        let inner = self.inner.lock();
        if !inner.containers.contains_key(id.as_str()) {
            return Err(LogError::ContainerNotFound(id.to_string()));
        }
        let skip = inner.logs.len().saturating_sub(lines as usize);
        Ok(inner.logs.iter().skip(skip).map(LogLine::stdout).collect())
    }
}

#[async_trait]
impl StatsOps for FakeRuntime {
    async fn stats(&self, id: &ContainerId) -> Result<ResourceUsage, StatsError> {
        let inner = self.inner.lock();
        if !inner.containers.contains_key(id.as_str()) {
            return Err(StatsError::ContainerNotFound(id.to_string()));
        }
        Ok(inner.usage)
    }
}

#[async_trait]
impl HttpTransport for FakeRuntime {
    async fn get(&self, port: u16, _path: &str) -> Result<HttpResponse, HttpError> {
        let inner = self.inner.lock();
        let serving = inner
            .containers
            .values()
            .find(|c| c.is_running() && c.host_ports.contains(&port));
        match serving {
            None => Err(HttpError::Connect {
                port,
                reason: "connection refused".to_string(),
            }),
            Some(c) if inner.http_broken.contains(&(c.image.clone(), port)) => Ok(HttpResponse {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Some(_) => Ok(HttpResponse {
                status: 200,
                body: "ok".to_string(),
            }),
        }
    }
}

// =============================================================================
// State store
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.records.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.records.lock().insert(key.to_string(), value.to_string());
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.records
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn check_writable(&self, key: &str) -> Result<(), StoreError> {
        if *self.fail_writes.lock() {
            Err(StoreError::Malformed {
                key: key.to_string(),
                reason: "disk full".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_writable(key)?;
        self.insert(key, value);
        Ok(())
    }

    async fn create_exclusive(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.check_writable(key)?;
        let mut records = self.records.lock();
        if records.contains_key(key) {
            return Ok(false);
        }
        records.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.records.lock().remove(key);
        Ok(())
    }
}

// =============================================================================
// Backup store
// =============================================================================

#[derive(Debug, Clone)]
struct FakeArchive {
    size: u64,
    corrupt: bool,
}

#[derive(Default)]
struct BackupInner {
    files: BTreeMap<String, FakeArchive>,
    sources: Vec<BackupSource>,
    corrupt_next: bool,
    fail_archive: bool,
    restored: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeBackupStore {
    inner: Mutex<BackupInner>,
}

impl FakeBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an archive as if an earlier run had written it.
    pub fn seed(&self, path: &str, size: u64) {
        self.inner.lock().files.insert(
            path.to_string(),
            FakeArchive {
                size,
                corrupt: false,
            },
        );
    }

    pub fn corrupt(&self, path: &str) {
        if let Some(file) = self.inner.lock().files.get_mut(path) {
            file.corrupt = true;
        }
    }

    /// The next archive written fails verification.
    pub fn corrupt_next(&self) {
        self.inner.lock().corrupt_next = true;
    }

    pub fn fail_archive(&self) {
        self.inner.lock().fail_archive = true;
    }

    pub fn paths(&self) -> Vec<String> {
        self.inner.lock().files.keys().cloned().collect()
    }

    pub fn sources(&self) -> Vec<BackupSource> {
        self.inner.lock().sources.clone()
    }

    /// `(archive, into)` pairs in restore order.
    pub fn restored(&self) -> Vec<(String, String)> {
        self.inner.lock().restored.clone()
    }
}

#[async_trait]
impl BackupStore for FakeBackupStore {
    async fn archive(&self, source: &BackupSource, path: &str) -> Result<(), BackupError> {
        let mut inner = self.inner.lock();
        if inner.fail_archive {
            return Err(BackupError::Listing {
                dir: path.to_string(),
                reason: "no space left on device".to_string(),
            });
        }
        let corrupt = std::mem::take(&mut inner.corrupt_next);
        inner.sources.push(source.clone());
        inner
            .files
            .insert(path.to_string(), FakeArchive { size: 4096, corrupt });
        Ok(())
    }

    async fn verify(&self, path: &str, _tar: bool) -> Result<bool, BackupError> {
        Ok(self
            .inner
            .lock()
            .files
            .get(path)
            .is_some_and(|f| !f.corrupt))
    }

    async fn size(&self, path: &str) -> Result<u64, BackupError> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|f| f.size)
            .ok_or_else(|| BackupError::Listing {
                dir: path.to_string(),
                reason: "no such file".to_string(),
            })
    }

    async fn list(&self, dir: &str) -> Result<Vec<ListedFile>, BackupError> {
        Ok(self
            .inner
            .lock()
            .files
            .iter()
            .filter_map(|(path, file)| {
                let (parent, name) = path.rsplit_once('/')?;
                (parent == dir).then(|| ListedFile {
                    name: name.to_string(),
                    size: file.size,
                })
            })
            .collect())
    }

    async fn remove(&self, path: &str) -> Result<(), BackupError> {
        self.inner.lock().files.remove(path);
        Ok(())
    }

    async fn restore(&self, path: &str, into: &str) -> Result<(), BackupError> {
        self.inner
            .lock()
            .restored
            .push((path.to_string(), into.to_string()));
        Ok(())
    }
}
