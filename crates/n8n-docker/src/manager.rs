use crate::engine::Engine;
use crate::resolve::VersionResolver;
use n8n_types::{evaluate_upgrade, AppConfig, ManagerError, PreUpgradeReport, Result};
use std::sync::Arc;
use tracing::info;

/// Lifecycle manager for the single named application container.
///
/// The engine handle is built once by the caller and injected here, so every
/// component shares it and tests can substitute an in-memory engine.
///
/// # Examples
///
/// ```rust,no_run
/// use n8n_docker::{AppManager, DockerEngine};
/// use n8n_types::AppConfig;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = AppConfig::default();
///     let engine = DockerEngine::connect(&config.docker)?;
///     let manager = AppManager::new(Arc::new(engine), config);
///
///     let status = manager.get_status().await?;
///     println!("{} {:?}", status.status, status.current_version);
///     Ok(())
/// }
/// ```
pub struct AppManager {
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) config: AppConfig,
    pub(crate) resolver: VersionResolver,
}

impl AppManager {
    pub fn new(engine: Arc<dyn Engine>, config: AppConfig) -> Self {
        let resolver = VersionResolver::from_settings(&config.container);
        Self {
            engine,
            config,
            resolver,
        }
    }

    /// Replace the default strategy chain
    pub fn with_resolver(mut self, resolver: VersionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn container_name(&self) -> &str {
        &self.config.container.name
    }

    /// Compare the running version against `target`
    pub async fn check_upgrade(&self, target: &str) -> Result<PreUpgradeReport> {
        let status = self.get_status().await?;
        evaluate_upgrade(status.known_version(), target)
    }

    pub async fn start_container(&self) -> Result<()> {
        let name = self.container_name();
        self.require_container().await?;
        self.engine.start_container(name).await.map_err(|e| e.in_step("Start container"))?;
        info!("Started container {}", name);
        Ok(())
    }

    pub async fn stop_container(&self) -> Result<()> {
        let name = self.container_name();
        self.require_container().await?;
        self.engine
            .stop_container(name, self.config.container.stop_timeout())
            .await
            .map_err(|e| e.in_step("Stop container"))?;
        info!("Stopped container {}", name);
        Ok(())
    }

    pub async fn restart_container(&self) -> Result<()> {
        let name = self.container_name();
        self.require_container().await?;
        self.engine
            .restart_container(name, self.config.container.stop_timeout())
            .await
            .map_err(|e| e.in_step("Restart container"))?;
        info!("Restarted container {}", name);
        Ok(())
    }

    async fn require_container(&self) -> Result<()> {
        match self.engine.inspect_container(self.container_name()).await? {
            Some(_) => Ok(()),
            None => Err(ManagerError::NotFound(self.container_name().to_string())),
        }
    }
}
