//! Recreating the managed container under a new image tag

use crate::checkpoint::{CheckpointStore, UpgradeCheckpoint, UpgradeStage};
use crate::engine::{ContainerDetails, ContainerSpec, MountKind};
use crate::manager::AppManager;
use crate::progress::ProgressSink;
use n8n_types::{AccessMode, Result, RuntimeConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const BUILTIN_NETWORKS: &[&str] = &["bridge", "host", "none"];

/// Result of [`AppManager::recover`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// No interrupted upgrade was recorded
    NoCheckpoint,
    /// The container exists; the stale checkpoint was discarded
    NothingToRecover,
    /// The container was left stopped mid-upgrade and has been started again
    Restarted { container_id: String },
    Recreated { container_id: String, image: String },
}

/// Network to reattach: the first user-defined one, else whatever is first
pub(crate) fn select_network(networks: &[String]) -> Option<String> {
    networks
        .iter()
        .find(|name| !BUILTIN_NETWORKS.contains(&name.as_str()))
        .or_else(|| networks.first())
        .cloned()
}

/// Runtime configuration of an existing container
pub(crate) fn capture_runtime(details: &ContainerDetails) -> RuntimeConfig {
    let mut runtime = RuntimeConfig {
        environment: RuntimeConfig::parse_environment(details.environment.iter().map(String::as_str)),
        network_name: select_network(&details.networks),
        ..Default::default()
    };

    for (port, host_ports) in &details.port_bindings {
        let container_port = port.split('/').next().and_then(|p| p.parse::<u16>().ok());
        let host_port = host_ports.first().and_then(|p| p.parse::<u16>().ok());
        if let (Some(container_port), Some(host_port)) = (container_port, host_port) {
            runtime.add_port_binding(container_port, host_port);
        }
    }

    for mount in details.mounts.iter().filter(|m| m.kind == MountKind::Volume) {
        if let Some(name) = mount.name.as_deref().filter(|n| !n.is_empty()) {
            let mode = if mount.read_write { AccessMode::Rw } else { AccessMode::Ro };
            runtime.add_volume_mount(name, &mount.destination, mode);
        }
    }

    runtime
}

/// Fallback candidates when the captured network refuses the container
fn fallback_networks<'a>(available: &'a [String], captured: &str) -> Vec<&'a String> {
    available
        .iter()
        .filter(|name| name.to_lowercase().contains("web") || name.contains(captured))
        .collect()
}

impl AppManager {
    pub(crate) fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(&self.config.state.dir, self.container_name())
    }

    /// Replace the managed container with one running `target`, keeping its
    /// ports, volumes, environment and network. Returns the new container id.
    ///
    /// The upgrade is not atomic: between removal and start no container of
    /// the managed name exists. A checkpoint written before the first
    /// destructive step lets [`AppManager::recover`] restore it.
    pub async fn upgrade_to(&self, target: &str, progress: &dyn ProgressSink) -> Result<String> {
        let name = self.container_name();
        let store = self.checkpoints();
        let _lock = store.lock()?;

        let target_image = self.config.container.image_reference(target);
        info!("Upgrading {} to {}", name, target_image);

        progress.report("Getting current container configuration...");
        let existing = self
            .engine
            .inspect_container(name)
            .await
            .map_err(|e| e.in_step("Capture configuration"))?;

        let defaults = &self.config.container.defaults;
        let (runtime, mut checkpoint) = match existing {
            Some(details) => {
                let runtime = capture_runtime(&details).or_defaults(defaults);
                let previous_image = self.image_reference_of(&details).await;
                let mut checkpoint = Some(UpgradeCheckpoint::new(
                    name,
                    previous_image,
                    target_image.clone(),
                    runtime.clone(),
                ));
                self.advance(&store, &mut checkpoint, UpgradeStage::Captured).await?;

                progress.report("Stopping current container...");
                self.advance(&store, &mut checkpoint, UpgradeStage::Stopping).await?;
                self.engine
                    .stop_container(name, self.config.container.stop_timeout())
                    .await
                    .map_err(|e| e.in_step("Stop container"))?;

                progress.report("Removing old container...");
                self.advance(&store, &mut checkpoint, UpgradeStage::Removing).await?;
                self.engine
                    .remove_container(name)
                    .await
                    .map_err(|e| e.in_step("Remove container"))?;

                (runtime, checkpoint)
            }
            None => {
                progress.report("Container not found, creating new one...");
                match store.load().await.map_err(|e| e.in_step("Read checkpoint"))? {
                    Some(mut previous) => {
                        info!(
                            "Reusing configuration captured by an interrupted upgrade (stage {:?})",
                            previous.stage
                        );
                        previous.target_image = target_image.clone();
                        (previous.runtime_config.clone(), Some(previous))
                    }
                    None => (defaults.clone(), None),
                }
            }
        };
        debug!("Runtime configuration for {}: {:?}", name, runtime);

        progress.report(&format!("Pulling image {}...", target_image));
        self.advance(&store, &mut checkpoint, UpgradeStage::Pulling).await?;
        self.engine
            .pull_image(&target_image)
            .await
            .map_err(|e| e.in_step("Pull image"))?;

        progress.report("Creating new container...");
        self.advance(&store, &mut checkpoint, UpgradeStage::Creating).await?;
        let container_id = self.create_managed(&target_image, &runtime).await?;

        if let Some(network) = runtime.network_name.as_deref() {
            self.advance(&store, &mut checkpoint, UpgradeStage::AttachingNetwork).await?;
            self.attach_network(network, &container_id).await;
        }

        progress.report("Starting new container...");
        self.advance(&store, &mut checkpoint, UpgradeStage::Starting).await?;
        self.engine
            .start_container(&container_id)
            .await
            .map_err(|e| e.in_step("Start container"))?;

        if checkpoint.is_some() {
            store.clear().await.map_err(|e| e.in_step("Clear checkpoint"))?;
        }
        progress.report("Upgrade complete!");
        info!("Container {} now runs {} ({})", name, target_image, container_id);
        Ok(container_id)
    }

    /// Finish an upgrade that stopped after the container was removed.
    ///
    /// A container that still exists but was left stopped by a destructive
    /// stage is started again. The checkpoint is kept when that fails.
    pub async fn recover(&self) -> Result<RecoveryOutcome> {
        let store = self.checkpoints();
        let _lock = store.lock()?;
        let checkpoint = match store.load().await.map_err(|e| e.in_step("Read checkpoint"))? {
            Some(checkpoint) => checkpoint,
            None => return Ok(RecoveryOutcome::NoCheckpoint),
        };

        let name = self.container_name();
        if let Some(details) = self.engine.inspect_container(name).await? {
            let stopped = details.state.status != "running";
            if stopped && checkpoint.stage != UpgradeStage::Captured {
                warn!(
                    "Starting {} left {} by an upgrade interrupted at stage {:?}",
                    name, details.state.status, checkpoint.stage
                );
                self.engine
                    .start_container(&details.id)
                    .await
                    .map_err(|e| e.in_step("Start container"))?;
                store.clear().await.map_err(|e| e.in_step("Clear checkpoint"))?;
                return Ok(RecoveryOutcome::Restarted {
                    container_id: details.id,
                });
            }

            info!(
                "Container {} exists; discarding checkpoint left at stage {:?}",
                name, checkpoint.stage
            );
            store.clear().await.map_err(|e| e.in_step("Clear checkpoint"))?;
            return Ok(RecoveryOutcome::NothingToRecover);
        }

        let image = checkpoint.recovery_image().to_string();
        warn!(
            "Recreating {} from {} after an upgrade interrupted at stage {:?}",
            name, image, checkpoint.stage
        );

        let runtime = &checkpoint.runtime_config;
        let container_id = self.create_managed(&image, runtime).await?;
        if let Some(network) = runtime.network_name.as_deref() {
            self.attach_network(network, &container_id).await;
        }
        self.engine
            .start_container(&container_id)
            .await
            .map_err(|e| e.in_step("Start container"))?;

        store.clear().await.map_err(|e| e.in_step("Clear checkpoint"))?;
        Ok(RecoveryOutcome::Recreated { container_id, image })
    }

    /// Remove a lock file left behind by a process that died mid-upgrade
    pub fn release_stale_lock(&self) -> Result<bool> {
        let path = self.checkpoints().lock_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                warn!("Removed stale upgrade lock {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn advance(
        &self,
        store: &CheckpointStore,
        checkpoint: &mut Option<UpgradeCheckpoint>,
        stage: UpgradeStage,
    ) -> Result<()> {
        if let Some(checkpoint) = checkpoint.as_mut() {
            checkpoint.stage = stage;
            store.save(checkpoint).await.map_err(|e| e.in_step("Write checkpoint"))?;
        }
        Ok(())
    }

    async fn create_managed(&self, image: &str, runtime: &RuntimeConfig) -> Result<String> {
        let spec = ContainerSpec {
            image: image.to_string(),
            runtime: runtime.clone(),
            restart_policy: self.config.container.restart_policy.clone(),
        };
        self.engine
            .create_container(self.container_name(), &spec)
            .await
            .map_err(|e| e.in_step("Create container"))
    }

    /// `image:tag` of the image behind `details`, or its id when untagged
    async fn image_reference_of(&self, details: &ContainerDetails) -> Option<String> {
        if details.image_id.is_empty() {
            return None;
        }
        match self.engine.inspect_image(&details.image_id).await {
            Ok(image) => Some(
                self.resolver
                    .matching_tag(&image.repo_tags)
                    .map(|tag| self.config.container.image_reference(tag))
                    .unwrap_or_else(|| details.image_id.clone()),
            ),
            Err(e) => {
                debug!("Could not inspect image {}: {}", details.image_id, e);
                Some(details.image_id.clone())
            }
        }
    }

    /// Reattach to the captured network; failures are logged, never fatal
    async fn attach_network(&self, network: &str, container_id: &str) {
        if network == "bridge" {
            return;
        }

        let first_error = match self.engine.connect_network(network, container_id).await {
            Ok(()) => {
                debug!("Connected {} to {}", container_id, network);
                return;
            }
            Err(e) => e,
        };
        warn!("Could not reconnect to network {}: {}", network, first_error);

        let available = match self.engine.list_networks().await {
            Ok(available) => available,
            Err(e) => {
                warn!("Could not list networks: {}", e);
                return;
            }
        };

        for candidate in fallback_networks(&available, network) {
            match self.engine.connect_network(candidate, container_id).await {
                Ok(()) => {
                    info!("Connected {} to fallback network {}", container_id, candidate);
                    return;
                }
                Err(e) => debug!("Network {} refused {}: {}", candidate, container_id, e),
            }
        }
        warn!("Container {} left without its previous network {}", container_id, network);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineState, MountInfo};
    use std::collections::BTreeMap;

    fn details() -> ContainerDetails {
        let mut port_bindings = BTreeMap::new();
        port_bindings.insert("5678/tcp".to_string(), vec!["8080".to_string()]);
        port_bindings.insert("9000/tcp".to_string(), vec![]);

        ContainerDetails {
            id: "abc".to_string(),
            name: "n8n".to_string(),
            image_id: "sha256:1".to_string(),
            state: EngineState::default(),
            environment: vec!["N8N_HOST=example.com".to_string(), "GENERIC_TIMEZONE=UTC".to_string()],
            port_bindings,
            mounts: vec![
                MountInfo {
                    kind: MountKind::Volume,
                    name: Some("n8n_data".to_string()),
                    source: Some("/var/lib/docker/volumes/n8n_data/_data".to_string()),
                    destination: "/home/node/.n8n".to_string(),
                    read_write: true,
                },
                MountInfo {
                    kind: MountKind::Volume,
                    name: Some("n8n_files".to_string()),
                    source: None,
                    destination: "/files".to_string(),
                    read_write: false,
                },
                MountInfo {
                    kind: MountKind::Bind,
                    name: None,
                    source: Some("/srv/backups".to_string()),
                    destination: "/backups".to_string(),
                    read_write: true,
                },
            ],
            networks: vec!["bridge".to_string(), "n8n_web".to_string()],
        }
    }

    #[test]
    fn test_capture_runtime() {
        let runtime = capture_runtime(&details());

        assert_eq!(runtime.port_bindings.len(), 1);
        assert_eq!(runtime.port_bindings.get(&5678), Some(&8080));
        assert_eq!(runtime.volume_mounts.len(), 2);
        assert_eq!(runtime.volume_mounts["n8n_files"].mode, AccessMode::Ro);
        assert_eq!(runtime.environment.get("N8N_HOST"), Some(&"example.com".to_string()));
        assert_eq!(runtime.network_name.as_deref(), Some("n8n_web"));
    }

    #[test]
    fn test_select_network() {
        assert_eq!(select_network(&["bridge".to_string()]), Some("bridge".to_string()));
        assert_eq!(
            select_network(&["bridge".to_string(), "proxy".to_string()]),
            Some("proxy".to_string())
        );
        assert_eq!(select_network(&[]), None);
    }

    #[test]
    fn test_fallback_networks() {
        let available = vec![
            "bridge".to_string(),
            "stack_WEB".to_string(),
            "stack_backend".to_string(),
            "old_backend_2".to_string(),
        ];
        let candidates = fallback_networks(&available, "backend_2");
        assert_eq!(candidates, vec!["stack_WEB", "old_backend_2"]);
    }
}
