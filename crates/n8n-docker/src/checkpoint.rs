//! Persisted upgrade progress and the per-container upgrade lock

use chrono::{DateTime, Utc};
use n8n_types::{ManagerError, Result, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Last step an upgrade entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStage {
    Captured,
    Stopping,
    Removing,
    Pulling,
    Creating,
    AttachingNetwork,
    Starting,
}

impl UpgradeStage {
    /// Whether the original container may already be gone
    pub fn is_destructive(&self) -> bool {
        !matches!(self, UpgradeStage::Captured | UpgradeStage::Stopping)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeCheckpoint {
    pub container_name: String,
    /// Image reference the container ran before the upgrade, when known
    pub previous_image: Option<String>,
    pub target_image: String,
    pub runtime_config: RuntimeConfig,
    pub stage: UpgradeStage,
    pub created_at: DateTime<Utc>,
}

impl UpgradeCheckpoint {
    pub fn new(
        container_name: &str,
        previous_image: Option<String>,
        target_image: String,
        runtime_config: RuntimeConfig,
    ) -> Self {
        Self {
            container_name: container_name.to_string(),
            previous_image,
            target_image,
            runtime_config,
            stage: UpgradeStage::Captured,
            created_at: Utc::now(),
        }
    }

    /// Image to recreate the container from after an interrupted upgrade
    pub fn recovery_image(&self) -> &str {
        self.previous_image.as_deref().unwrap_or(&self.target_image)
    }
}

/// Where checkpoints and locks live for one container
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    container_name: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, container_name: &str) -> Self {
        Self {
            dir: dir.into(),
            container_name: container_name.to_string(),
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(format!("{}.upgrade.json", self.container_name))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.container_name))
    }

    pub async fn save(&self, checkpoint: &UpgradeCheckpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.checkpoint_path();
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Checkpoint for {} at stage {:?}", checkpoint.container_name, checkpoint.stage);
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<UpgradeCheckpoint>> {
        match tokio::fs::read(self.checkpoint_path()).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(self.checkpoint_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Take the upgrade lock, failing with `UpgradeInProgress` when held
    pub fn lock(&self) -> Result<UpgradeLock> {
        UpgradeLock::acquire(&self.dir, self.lock_path(), &self.container_name)
    }
}

/// Exclusive lock file, removed when dropped
#[derive(Debug)]
pub struct UpgradeLock {
    path: PathBuf,
}

impl UpgradeLock {
    fn acquire(dir: &Path, path: PathBuf, container_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                return Err(ManagerError::UpgradeInProgress(format!(
                    "{} (lock file {})",
                    container_name,
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired upgrade lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpgradeLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release upgrade lock {}: {}", self.path.display(), e);
        }
    }
}
