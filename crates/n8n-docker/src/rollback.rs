use crate::manager::AppManager;
use crate::progress::ProgressSink;
use n8n_types::{LocalImage, ManagerError, Result, UNKNOWN_VERSION};
use tracing::info;

/// Choose the version to roll back to from the newest-first inventory.
///
/// Prefers the second-newest image; when that one carries the running
/// version, takes the first image in inventory order that does not.
pub fn select_rollback_target(images: &[LocalImage], current: Option<&str>) -> Result<String> {
    if images.len() < 2 {
        return Err(ManagerError::InsufficientHistory { found: images.len() });
    }

    let differs = |image: &&LocalImage| Some(image.version.as_str()) != current;
    images
        .get(1)
        .filter(differs)
        .or_else(|| images.iter().find(differs))
        .map(|image| image.version.clone())
        .ok_or_else(|| ManagerError::NoDistinctVersion(current.unwrap_or(UNKNOWN_VERSION).to_string()))
}

impl AppManager {
    /// Recreate the container on the previous locally available version
    pub async fn rollback_to_previous(&self, progress: &dyn ProgressSink) -> Result<String> {
        let status = self.get_status().await?;
        let images = self.list_local_images().await?;
        let target = select_rollback_target(&images, status.current_version.as_deref())?;

        info!(
            "Rolling back {} from {} to {}",
            self.container_name(),
            status.current_version.as_deref().unwrap_or(UNKNOWN_VERSION),
            target
        );
        self.upgrade_to(&target, progress).await
    }
}
