//! Manager configuration
//!
//! Every section has a `Default` matching a stock n8n docker-compose
//! deployment, so an empty config file is a valid one.

use crate::container::{AccessMode, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub container: ContainerSettings,
    pub backup: BackupSettings,
    pub registry: RegistrySettings,
    pub state: StateSettings,
    pub docker: DockerSettings,
}

/// The managed container and how it is recreated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    pub name: String,
    pub image: String,
    /// Tag that does not itself encode a version
    pub floating_tag: String,
    /// Image label keys consulted, in order, to resolve the floating tag
    pub version_labels: Vec<String>,
    pub stop_timeout_secs: u64,
    pub restart_policy: String,
    /// Used when the container does not exist at upgrade time
    pub defaults: RuntimeConfig,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            name: "n8n".to_string(),
            image: "n8nio/n8n".to_string(),
            floating_tag: "latest".to_string(),
            version_labels: vec![
                "org.opencontainers.image.version".to_string(),
                "version".to_string(),
                "n8n.version".to_string(),
                "io.n8n.version".to_string(),
            ],
            stop_timeout_secs: 60,
            restart_policy: "unless-stopped".to_string(),
            defaults: RuntimeConfig::new()
                .with_port_binding(5678, 5678)
                .with_volume_mount("n8n_data", "/home/node/.n8n", AccessMode::Rw),
        }
    }
}

impl ContainerSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn image_reference(&self, tag: &str) -> String {
        format!("{}:{}", self.image, tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Named volume that is archived
    pub data_volume: String,
    /// Container this manager runs in; its mount table gives the host path
    pub dashboard_container: String,
    /// Mount destination, inside the dashboard container, of the backup dir
    pub mount_destination: String,
    pub helper_image: String,
    pub file_prefix: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            data_volume: "n8n_data".to_string(),
            dashboard_container: "n8n-manager-dashboard".to_string(),
            mount_destination: "/app/backups".to_string(),
            helper_image: "busybox:latest".to_string(),
            file_prefix: "n8n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub tags_url: String,
    pub releases_url: String,
    pub release_tag_prefixes: Vec<String>,
    pub page_size: u32,
    pub page_timeout_secs: u64,
    pub release_timeout_secs: u64,
    pub page_retries: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            tags_url: "https://hub.docker.com/v2/repositories/n8nio/n8n/tags".to_string(),
            releases_url: "https://api.github.com/repos/n8n-io/n8n/releases/latest".to_string(),
            release_tag_prefixes: vec!["n8n@".to_string(), "v".to_string()],
            page_size: 100,
            page_timeout_secs: 15,
            release_timeout_secs: 5,
            page_retries: 2,
        }
    }
}

impl RegistrySettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }
}

/// Where upgrade checkpoints and locks live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    pub dir: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("n8n-manager"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    /// Unix socket to use instead of the local defaults
    pub socket_path: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_secs: 120,
        }
    }
}
