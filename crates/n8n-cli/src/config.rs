use crate::error::{CliError, Result};
use n8n_types::AppConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_CONTAINER_NAME: &str = "N8N_CONTAINER_NAME";
pub const ENV_STATE_DIR: &str = "N8N_MANAGER_STATE_DIR";

pub struct ConfigManager {
    config: AppConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load the TOML config, writing the defaults first when the file is
    /// missing, then apply environment overrides.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        let config = if config_path.exists() {
            Self::load_config(&config_path)?
        } else {
            let default_config = AppConfig::default();
            Self::save_config(&default_config, &config_path)?;
            debug!("Wrote default configuration to {}", config_path.display());
            default_config
        };

        Ok(Self {
            config: apply_env_overrides(config, |key| std::env::var(key).ok()),
            config_path,
        })
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("n8n-manager").join("config.toml")
        } else {
            PathBuf::from("/etc/n8n-manager/config.toml")
        }
    }

    fn load_config(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::ConfigError(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content).map_err(|e| CliError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CliError::ConfigError(format!("Failed to create config directory: {}", e)))?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| CliError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CliError::ConfigError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

/// Environment variables win over the file
pub fn apply_env_overrides(mut config: AppConfig, lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
    if let Some(name) = lookup(ENV_CONTAINER_NAME).filter(|v| !v.is_empty()) {
        config.container.name = name;
    }
    if let Some(dir) = lookup(ENV_STATE_DIR).filter(|v| !v.is_empty()) {
        config.state.dir = PathBuf::from(dir);
    }
    config
}
