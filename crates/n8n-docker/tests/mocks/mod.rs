//! In-memory engine for exercising the manager without a Docker daemon

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use n8n_docker::{
    AppManager, ContainerDetails, ContainerSpec, Engine, EngineState, HelperSpec, ImageDetails, MountInfo, MountKind,
    StatsSample,
};
use n8n_types::{AppConfig, ManagerError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct MockState {
    containers: HashMap<String, ContainerDetails>,
    images: Vec<ImageDetails>,
    stats: Option<StatsSample>,
    networks: Vec<String>,
    refused_networks: HashSet<String>,
    missing_tags: HashSet<String>,
    failing_start: bool,
    failing_remove: bool,
    helper_exit: i64,
    helpers: Vec<HelperSpec>,
    created: Vec<(String, ContainerSpec)>,
    connected: Vec<(String, String)>,
    calls: Vec<String>,
    next_id: usize,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
}

/// A container as `docker run -p 5678:5678 -v n8n_data:/home/node/.n8n` leaves it
pub fn n8n_container(name: &str, image_id: &str, status: &str) -> ContainerDetails {
    let mut port_bindings = BTreeMap::new();
    port_bindings.insert("5678/tcp".to_string(), vec!["5678".to_string()]);

    ContainerDetails {
        id: format!("{}-id", name),
        name: name.to_string(),
        image_id: image_id.to_string(),
        state: EngineState {
            status: status.to_string(),
            started_at: Some("2024-05-01T10:00:00Z".to_string()),
            health: None,
        },
        environment: vec![
            "N8N_HOST=n8n.example.com".to_string(),
            "WEBHOOK_URL=https://n8n.example.com/".to_string(),
        ],
        port_bindings,
        mounts: vec![MountInfo {
            kind: MountKind::Volume,
            name: Some("n8n_data".to_string()),
            source: Some("/var/lib/docker/volumes/n8n_data/_data".to_string()),
            destination: "/home/node/.n8n".to_string(),
            read_write: true,
        }],
        networks: vec!["n8n_web".to_string()],
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: impl Into<String>) {
        self.lock().calls.push(call.into());
    }

    pub fn with_container(self, details: ContainerDetails) -> Self {
        self.lock().containers.insert(details.name.clone(), details);
        self
    }

    pub fn with_image(self, id: &str, tags: &[&str], labels: &[(&str, &str)], created: DateTime<Utc>) -> Self {
        self.lock().images.push(ImageDetails {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            created: Some(created),
        });
        self
    }

    pub fn with_stats(self, stats: StatsSample) -> Self {
        self.lock().stats = Some(stats);
        self
    }

    pub fn with_networks(self, networks: &[&str]) -> Self {
        self.lock().networks = networks.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn refusing_network(self, network: &str) -> Self {
        self.lock().refused_networks.insert(network.to_string());
        self
    }

    pub fn missing_tag(self, reference: &str) -> Self {
        self.lock().missing_tags.insert(reference.to_string());
        self
    }

    pub fn failing_start(self) -> Self {
        self.lock().failing_start = true;
        self
    }

    pub fn failing_remove(self) -> Self {
        self.lock().failing_remove = true;
        self
    }

    /// Toggle start failures on an engine already handed to a manager
    pub fn set_failing_start(&self, failing: bool) {
        self.lock().failing_start = failing;
    }

    pub fn helper_exit(self, code: i64) -> Self {
        self.lock().helper_exit = code;
        self
    }

    /// Engine calls by method name, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls that change state, in order
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("inspect") && !call.starts_with("list") && call != "stats")
            .collect()
    }

    pub fn container(&self, name: &str) -> Option<ContainerDetails> {
        self.lock().containers.get(name).cloned()
    }

    pub fn created(&self) -> Vec<(String, ContainerSpec)> {
        self.lock().created.clone()
    }

    pub fn connected(&self) -> Vec<(String, String)> {
        self.lock().connected.clone()
    }

    pub fn helpers(&self) -> Vec<HelperSpec> {
        self.lock().helpers.clone()
    }

    pub fn remove(&self, name: &str) {
        self.lock().containers.remove(name);
    }
}

fn find_by_name_or_id<'a>(state: &'a mut MockState, key: &str) -> Option<&'a mut ContainerDetails> {
    state
        .containers
        .values_mut()
        .find(|details| details.name == key || details.id == key)
}

#[async_trait]
impl Engine for MockEngine {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        self.record("inspect_container");
        Ok(self.lock().containers.get(name).cloned())
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails> {
        self.record("inspect_image");
        self.lock()
            .images
            .iter()
            .find(|image| image.id == reference || image.repo_tags.iter().any(|tag| tag == reference))
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(format!("No such image: {}", reference)))
    }

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageDetails>> {
        self.record("list_images");
        let prefix = format!("{}:", repository);
        Ok(self
            .lock()
            .images
            .iter()
            .filter(|image| image.repo_tags.iter().any(|tag| tag.starts_with(&prefix)))
            .cloned()
            .collect())
    }

    async fn stats(&self, _name: &str) -> Result<StatsSample> {
        self.record("stats");
        self.lock()
            .stats
            .clone()
            .ok_or_else(|| ManagerError::operation("Container stats", "stats unavailable"))
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.record("start_container");
        let mut state = self.lock();
        if state.failing_start {
            return Err(ManagerError::operation("Start container", "port is already allocated"));
        }
        let details = find_by_name_or_id(&mut state, name).ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        details.state.status = "running".to_string();
        Ok(())
    }

    async fn stop_container(&self, name: &str, _timeout: Duration) -> Result<()> {
        self.record("stop_container");
        let mut state = self.lock();
        let details = find_by_name_or_id(&mut state, name).ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        details.state.status = "exited".to_string();
        Ok(())
    }

    async fn restart_container(&self, name: &str, _timeout: Duration) -> Result<()> {
        self.record("restart_container");
        let mut state = self.lock();
        let details = find_by_name_or_id(&mut state, name).ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        details.state.status = "running".to_string();
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record("remove_container");
        let mut state = self.lock();
        if state.failing_remove {
            return Err(ManagerError::operation("Remove container", "removal of container is already in progress"));
        }
        state
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        self.record("pull_image");
        let mut state = self.lock();
        if state.missing_tags.contains(reference) {
            return Err(ManagerError::ImageNotFound(format!("{} (manifest unknown)", reference)));
        }
        if !state.images.iter().any(|image| image.repo_tags.iter().any(|tag| tag == reference)) {
            state.images.push(ImageDetails {
                id: format!("sha256:{}", reference),
                repo_tags: vec![reference.to_string()],
                labels: HashMap::new(),
                created: Some(Utc::now()),
            });
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String> {
        self.record("create_container");
        let mut state = self.lock();
        if state.containers.contains_key(name) {
            return Err(ManagerError::operation("Create container", format!("name {} is already in use", name)));
        }

        let image_id = state
            .images
            .iter()
            .find(|image| image.id == spec.image || image.repo_tags.iter().any(|tag| *tag == spec.image))
            .map(|image| image.id.clone())
            .ok_or_else(|| ManagerError::NotFound(format!("No such image: {}", spec.image)))?;

        state.next_id += 1;
        let id = format!("container-{}", state.next_id);
        let details = ContainerDetails {
            id: id.clone(),
            name: name.to_string(),
            image_id,
            state: EngineState {
                status: "created".to_string(),
                started_at: None,
                health: None,
            },
            environment: spec.runtime.environment_list(),
            port_bindings: spec
                .runtime
                .port_bindings
                .iter()
                .map(|(container, host)| (format!("{}/tcp", container), vec![host.to_string()]))
                .collect(),
            mounts: spec
                .runtime
                .volume_mounts
                .iter()
                .map(|(volume, mount)| MountInfo {
                    kind: MountKind::Volume,
                    name: Some(volume.clone()),
                    source: None,
                    destination: mount.mount_path.clone(),
                    read_write: mount.mode == n8n_types::AccessMode::Rw,
                })
                .collect(),
            networks: vec!["bridge".to_string()],
        };

        state.containers.insert(name.to_string(), details);
        state.created.push((name.to_string(), spec.clone()));
        Ok(id)
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        self.record("list_networks");
        Ok(self.lock().networks.clone())
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<()> {
        self.record("connect_network");
        let mut state = self.lock();
        if state.refused_networks.contains(network) || !state.networks.iter().any(|n| n == network) {
            return Err(ManagerError::NotFound(format!("network {} not found", network)));
        }
        let details =
            find_by_name_or_id(&mut state, container_id).ok_or_else(|| ManagerError::NotFound(container_id.to_string()))?;
        details.networks.push(network.to_string());
        state.connected.push((network.to_string(), container_id.to_string()));
        Ok(())
    }

    async fn run_helper(&self, spec: &HelperSpec) -> Result<i64> {
        self.record("run_helper");
        let mut state = self.lock();
        state.helpers.push(spec.clone());
        Ok(state.helper_exit)
    }
}

/// Manager over `engine` with its state directory inside `dir`
pub fn manager(engine: &MockEngine, dir: &TempDir) -> AppManager {
    let mut config = AppConfig::default();
    config.state.dir = dir.path().join("state");
    AppManager::new(Arc::new(engine.clone()), config)
}
