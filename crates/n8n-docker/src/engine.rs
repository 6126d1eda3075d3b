//! The slice of the container engine API the manager relies on
//!
//! Everything above this trait works on the plain data types below, so the
//! orchestration logic can be exercised against an in-memory engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use n8n_types::{Result, RuntimeConfig};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Inspection data of a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    /// Id of the image the container runs
    pub image_id: String,
    pub state: EngineState,
    /// `KEY=value` entries
    pub environment: Vec<String>,
    /// `"5678/tcp"` -> host ports bound to it
    pub port_bindings: BTreeMap<String, Vec<String>>,
    pub mounts: Vec<MountInfo>,
    /// Attached network names, sorted
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    /// Lowercase engine status (`running`, `exited`, ...)
    pub status: String,
    pub started_at: Option<String>,
    /// Health-check status when a health check is configured
    pub health: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Volume,
    Bind,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountInfo {
    pub kind: MountKind,
    /// Volume name, for volume mounts
    pub name: Option<String>,
    /// Host path backing the mount
    pub source: Option<String>,
    pub destination: String,
    pub read_write: bool,
}

/// Inspection data of an image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageDetails {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub labels: HashMap<String, String>,
    pub created: Option<DateTime<Utc>>,
}

/// One stats sample with the previous interval's counters alongside
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSample {
    pub cpu_total: u64,
    pub precpu_total: u64,
    pub system_cpu: Option<u64>,
    pub presystem_cpu: Option<u64>,
    /// Number of per-core usage counters reported
    pub percpu_count: usize,
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
}

/// What to create under the managed name
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub runtime: RuntimeConfig,
    pub restart_policy: String,
}

/// A disposable container that runs one command and is always removed
#[derive(Debug, Clone, PartialEq)]
pub struct HelperSpec {
    pub image: String,
    pub command: Vec<String>,
    /// `source:destination:mode` binds
    pub binds: Vec<String>,
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// `Ok(None)` when no container has this name
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>>;

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails>;

    /// Images whose repository matches `repository`
    async fn list_images(&self, repository: &str) -> Result<Vec<ImageDetails>>;

    async fn stats(&self, name: &str) -> Result<StatsSample>;

    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stopping an already stopped container succeeds.
    async fn stop_container(&self, name: &str, timeout: Duration) -> Result<()>;

    async fn restart_container(&self, name: &str, timeout: Duration) -> Result<()>;

    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Fails with `ImageNotFound` when the tag does not exist upstream.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Returns the new container id
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String>;

    async fn list_networks(&self) -> Result<Vec<String>>;

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<()>;

    /// Run a helper to completion and return its exit code
    async fn run_helper(&self, spec: &HelperSpec) -> Result<i64>;
}
