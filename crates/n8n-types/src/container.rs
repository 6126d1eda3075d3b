//! Container-related types shared across crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coarse runtime state of the managed container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
    Exited,
    NotFound,
    Unknown,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, RunState::Stopped | RunState::Exited)
    }
}

impl From<&str> for RunState {
    fn from(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "running" => RunState::Running,
            "exited" | "dead" => RunState::Exited,
            "stopped" | "created" | "paused" | "removing" => RunState::Stopped,
            "not_found" => RunState::NotFound,
            _ => RunState::Unknown,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Stopped => write!(f, "stopped"),
            RunState::Exited => write!(f, "exited"),
            RunState::NotFound => write!(f, "not_found"),
            RunState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health of the managed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Health {
    /// State reported by a configured health check, verbatim
    Reported(String),
    /// Running without a configured health check
    Unconfigured,
    Stopped,
    Unknown,
}

const UNCONFIGURED_HEALTH: &str = "healthy (no health check)";

impl Health {
    /// Use the engine's health-check state when present, otherwise infer one
    /// from the run state.
    pub fn infer(reported: Option<&str>, state: RunState) -> Self {
        match reported {
            Some(status) if !status.is_empty() => Health::Reported(status.to_string()),
            _ if state.is_running() => Health::Unconfigured,
            _ if state.is_stopped() => Health::Stopped,
            _ => Health::Unknown,
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Reported(status) => write!(f, "{}", status),
            Health::Unconfigured => write!(f, "{}", UNCONFIGURED_HEALTH),
            Health::Stopped => write!(f, "stopped"),
            Health::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<Health> for String {
    fn from(health: Health) -> Self {
        health.to_string()
    }
}

impl From<String> for Health {
    fn from(value: String) -> Self {
        match value.as_str() {
            UNCONFIGURED_HEALTH => Health::Unconfigured,
            "stopped" => Health::Stopped,
            "unknown" => Health::Unknown,
            _ => Health::Reported(value),
        }
    }
}

/// Snapshot of the managed container, recomputed on every query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub status: RunState,
    pub current_version: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub health: Option<Health>,
    pub cpu_percent: Option<f64>,
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
    pub memory_percent: Option<f64>,
}

impl ContainerStatus {
    pub fn not_found() -> Self {
        Self {
            status: RunState::NotFound,
            current_version: None,
            started_at: None,
            health: None,
            cpu_percent: None,
            memory_usage: None,
            memory_limit: None,
            memory_percent: None,
        }
    }

    /// Version of the running image, or `None` when absent or unresolved
    pub fn known_version(&self) -> Option<&str> {
        self.current_version
            .as_deref()
            .filter(|v| !v.is_empty() && *v != UNKNOWN_VERSION)
    }
}

/// Placeholder used when a version cannot be resolved
pub const UNKNOWN_VERSION: &str = "unknown";

/// A locally cached image of the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalImage {
    pub version: String,
    pub created_at: DateTime<Utc>,
}

/// Access mode of a volume mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Rw,
    Ro,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Rw => write!(f, "rw"),
            AccessMode::Ro => write!(f, "ro"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub mount_path: String,
    #[serde(default)]
    pub mode: AccessMode,
}

/// Runtime configuration captured from a container before it is recreated
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// container port -> host port
    #[serde(default, with = "port_map")]
    pub port_bindings: BTreeMap<u16, u16>,
    /// volume name -> mount
    #[serde(default)]
    pub volume_mounts: BTreeMap<String, VolumeMount>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub network_name: Option<String>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port_binding(&mut self, container_port: u16, host_port: u16) {
        self.port_bindings.insert(container_port, host_port);
    }

    pub fn add_volume_mount(&mut self, volume: &str, mount_path: &str, mode: AccessMode) {
        self.volume_mounts.insert(
            volume.to_owned(),
            VolumeMount {
                mount_path: mount_path.to_owned(),
                mode,
            },
        );
    }

    pub fn add_environment_variable(&mut self, key: &str, value: &str) {
        self.environment.insert(key.to_owned(), value.to_owned());
    }

    pub fn with_port_binding(mut self, container_port: u16, host_port: u16) -> Self {
        self.add_port_binding(container_port, host_port);
        self
    }

    pub fn with_volume_mount(mut self, volume: &str, mount_path: &str, mode: AccessMode) -> Self {
        self.add_volume_mount(volume, mount_path, mode);
        self
    }

    pub fn with_environment_variable(mut self, key: &str, value: &str) -> Self {
        self.add_environment_variable(key, value);
        self
    }

    pub fn with_network(mut self, network: &str) -> Self {
        self.network_name = Some(network.to_owned());
        self
    }

    /// Parse `KEY=value` entries; entries without `=` are dropped.
    pub fn parse_environment<'a>(entries: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
        entries
            .into_iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    pub fn environment_list(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    /// Bind strings in `volume:path:mode` form
    pub fn binds(&self) -> Vec<String> {
        self.volume_mounts
            .iter()
            .map(|(volume, mount)| format!("{}:{}:{}", volume, mount.mount_path, mount.mode))
            .collect()
    }

    /// Fill empty port or volume sections from `defaults`
    pub fn or_defaults(mut self, defaults: &RuntimeConfig) -> Self {
        if self.port_bindings.is_empty() {
            self.port_bindings = defaults.port_bindings.clone();
        }
        if self.volume_mounts.is_empty() {
            self.volume_mounts = defaults.volume_mounts.clone();
        }
        self
    }
}

/// Port maps are keyed by strings on the wire so TOML can carry them.
mod port_map {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(ports: &BTreeMap<u16, u16>, serializer: S) -> Result<S::Ok, S::Error> {
        ports
            .iter()
            .map(|(container, host)| (container.to_string(), *host))
            .collect::<BTreeMap<String, u16>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<u16, u16>, D::Error> {
        BTreeMap::<String, u16>::deserialize(deserializer)?
            .into_iter()
            .map(|(container, host)| {
                container
                    .parse::<u16>()
                    .map(|port| (port, host))
                    .map_err(|_| D::Error::custom(format!("invalid container port '{}'", container)))
            })
            .collect()
    }
}
