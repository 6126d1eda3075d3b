use crate::manager::AppManager;
use chrono::{DateTime, Utc};
use n8n_types::{LocalImage, Result};
use tracing::debug;

impl AppManager {
    /// Locally cached images of the application, newest first.
    ///
    /// Images sharing a resolved version are all kept.
    pub async fn list_local_images(&self) -> Result<Vec<LocalImage>> {
        let images = self.engine.list_images(&self.config.container.image).await?;

        let mut local: Vec<LocalImage> = images
            .iter()
            .filter_map(|image| {
                let version = self.resolver.version_of(image)?;
                Some(LocalImage {
                    version,
                    created_at: image.created.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                })
            })
            .collect();

        local.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!("Found {} local image(s) of {}", local.len(), self.config.container.image);
        Ok(local)
    }
}
