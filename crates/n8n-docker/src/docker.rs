//! bollard-backed engine

use crate::engine::{
    ContainerDetails, ContainerSpec, Engine, EngineState, HelperSpec, ImageDetails, MountInfo, MountKind, StatsSample,
};
use crate::error::{engine_error, is_not_found, is_not_modified, pull_error};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{
    ContainerInspectResponse, EndpointSettings, HostConfig, ImageInspect, ImageSummary, MountPointTypeEnum,
    PortBinding, PortMap, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::network::{ConnectNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;
use n8n_types::{DockerSettings, ManagerError, Result};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// Engine handle built once at start-up and shared by every component
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect(settings: &DockerSettings) -> Result<Self> {
        let docker = match &settings.socket_path {
            Some(path) => Docker::connect_with_unix(path, settings.timeout_secs, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(Duration::from_secs(settings.timeout_secs))),
        }
        .map_err(|e| ManagerError::Connection(format!("Failed to connect to Docker: {}", e)))?;

        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| ManagerError::Connection(format!("Docker daemon unreachable: {}", e)))
    }

    async fn ensure_image(&self, reference: &str) -> Result<()> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => self.pull_image(reference).await,
            Err(e) => Err(engine_error("Inspect image", e)),
        }
    }

    async fn start_and_wait(&self, id: &str) -> std::result::Result<i64, BollardError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;

        let mut exit_code = 0;
        let mut wait_stream = self.docker.wait_container(id, None::<WaitContainerOptions<String>>);
        while let Some(result) = wait_stream.next().await {
            match result {
                Ok(response) => exit_code = response.status_code,
                Err(BollardError::DockerContainerWaitError { code, .. }) => exit_code = code,
                Err(e) => return Err(e),
            }
        }
        Ok(exit_code)
    }
}

/// Split `repo[:tag]` into repository and tag, defaulting the tag to `latest`
pub(crate) fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (reference, "latest"),
    }
}

fn restart_policy_name(policy: &str) -> RestartPolicyNameEnum {
    match policy {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::EMPTY,
    }
}

fn parse_engine_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn container_details(info: ContainerInspectResponse) -> ContainerDetails {
    let state = info
        .state
        .map(|state| EngineState {
            status: state.status.map(|s| s.to_string()).unwrap_or_default(),
            started_at: state.started_at,
            health: state
                .health
                .and_then(|health| health.status)
                .map(|status| status.to_string())
                .filter(|status| !status.is_empty() && status != "none"),
        })
        .unwrap_or_default();

    let port_bindings = info
        .host_config
        .and_then(|host_config| host_config.port_bindings)
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let host_ports = bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|binding| binding.host_port)
                .filter(|host_port| !host_port.is_empty())
                .collect();
            (port, host_ports)
        })
        .collect::<BTreeMap<_, _>>();

    let mounts = info
        .mounts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|mount| {
            Some(MountInfo {
                kind: match mount.typ {
                    Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
                    Some(MountPointTypeEnum::BIND) => MountKind::Bind,
                    _ => MountKind::Other,
                },
                name: mount.name,
                source: mount.source,
                destination: mount.destination?,
                read_write: mount.rw.unwrap_or(true),
            })
        })
        .collect();

    let mut networks: Vec<String> = info
        .network_settings
        .and_then(|settings| settings.networks)
        .map(|networks| networks.into_keys().collect())
        .unwrap_or_default();
    networks.sort();

    ContainerDetails {
        id: info.id.unwrap_or_default(),
        name: info.name.unwrap_or_default().trim_start_matches('/').to_string(),
        image_id: info.image.unwrap_or_default(),
        state,
        environment: info.config.and_then(|config| config.env).unwrap_or_default(),
        port_bindings,
        mounts,
        networks,
    }
}

fn image_details(image: ImageInspect) -> ImageDetails {
    ImageDetails {
        id: image.id.unwrap_or_default(),
        repo_tags: image.repo_tags.unwrap_or_default(),
        labels: image.config.and_then(|config| config.labels).unwrap_or_default(),
        created: image.created.as_deref().and_then(parse_engine_time),
    }
}

fn image_summary_details(image: ImageSummary) -> ImageDetails {
    ImageDetails {
        id: image.id,
        repo_tags: image.repo_tags,
        labels: image.labels,
        created: DateTime::<Utc>::from_timestamp(image.created, 0),
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .runtime
        .port_bindings
        .keys()
        .map(|port| (format!("{}/tcp", port), HashMap::new()))
        .collect();

    let port_bindings: PortMap = spec
        .runtime
        .port_bindings
        .iter()
        .map(|(container_port, host_port)| {
            (
                format!("{}/tcp", container_port),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                }]),
            )
        })
        .collect();

    let volumes: HashMap<String, HashMap<(), ()>> = spec
        .runtime
        .volume_mounts
        .values()
        .map(|mount| (mount.mount_path.clone(), HashMap::new()))
        .collect();

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.runtime.environment_list()),
        exposed_ports: Some(exposed_ports),
        volumes: Some(volumes),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.runtime.binds()),
            restart_policy: Some(RestartPolicy {
                name: Some(restart_policy_name(&spec.restart_policy)),
                maximum_retry_count: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        debug!("Inspecting container {}", name);
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(container_details(info))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(engine_error("Inspect container", e)),
        }
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails> {
        self.docker
            .inspect_image(reference)
            .await
            .map(image_details)
            .map_err(|e| engine_error("Inspect image", e))
    }

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageDetails>> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![repository.to_string()]);

        let options = ListImagesOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| engine_error("List images", e))?;

        Ok(images.into_iter().map(image_summary_details).collect())
    }

    async fn stats(&self, name: &str) -> Result<StatsSample> {
        // one_shot would leave precpu_stats empty
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };

        let mut stream = self.docker.stats(name, Some(options));
        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => return Err(engine_error("Container stats", e)),
            None => return Err(ManagerError::operation("Container stats", "no stats sample returned")),
        };
        drop(stream);

        Ok(StatsSample {
            cpu_total: stats.cpu_stats.cpu_usage.total_usage,
            precpu_total: stats.precpu_stats.cpu_usage.total_usage,
            system_cpu: stats.cpu_stats.system_cpu_usage,
            presystem_cpu: stats.precpu_stats.system_cpu_usage,
            percpu_count: stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(Vec::len)
                .unwrap_or(0),
            memory_usage: stats.memory_stats.usage,
            memory_limit: stats.memory_stats.limit,
        })
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        debug!("Starting container {}", name);
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| engine_error("Start container", e))
    }

    async fn stop_container(&self, name: &str, timeout: Duration) -> Result<()> {
        debug!("Stopping container {} (timeout {:?})", name, timeout);
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };

        match self.docker.stop_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(engine_error("Stop container", e)),
        }
    }

    async fn restart_container(&self, name: &str, timeout: Duration) -> Result<()> {
        debug!("Restarting container {}", name);
        let options = RestartContainerOptions {
            t: timeout.as_secs() as isize,
        };

        self.docker
            .restart_container(name, Some(options))
            .await
            .map_err(|e| engine_error("Restart container", e))
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        debug!("Removing container {}", name);
        let options = RemoveContainerOptions {
            force: false,
            v: false,
            ..Default::default()
        };

        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| engine_error("Remove container", e))
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let (repository, tag) = split_reference(reference);
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull {}: {}", reference, status);
                    }
                }
                Err(e) => return Err(pull_error(reference, e)),
            }
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String> {
        debug!("Creating container {} from {}", name, spec.image);
        let options = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| engine_error("Create container", e))?;

        Ok(response.id)
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(|e| engine_error("List networks", e))?;

        Ok(networks.into_iter().filter_map(|network| network.name).collect())
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<()> {
        debug!("Connecting {} to network {}", container_id, network);
        let options = ConnectNetworkOptions {
            container: container_id.to_string(),
            endpoint_config: EndpointSettings::default(),
        };

        self.docker
            .connect_network(network, options)
            .await
            .map_err(|e| engine_error("Connect network", e))
    }

    async fn run_helper(&self, spec: &HelperSpec) -> Result<i64> {
        self.ensure_image(&spec.image).await?;

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let helper_name = format!("n8n-helper-{}", Utc::now().timestamp_millis());
        let options = CreateContainerOptions {
            name: helper_name.clone(),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| engine_error("Create helper container", e))?;
        debug!("Running helper {} ({})", helper_name, spec.image);

        let outcome = self.start_and_wait(&container.id).await;

        // The helper is removed whatever happened above
        let removal = self
            .docker
            .remove_container(
                &container.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        let exit_code = outcome.map_err(|e| engine_error("Run helper container", e))?;
        removal.map_err(|e| engine_error("Remove helper container", e))?;
        Ok(exit_code)
    }
}
