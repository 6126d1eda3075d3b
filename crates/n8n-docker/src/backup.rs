//! Volume snapshots through a disposable helper container

use crate::engine::{ContainerDetails, HelperSpec};
use crate::manager::AppManager;
use chrono::{DateTime, Local};
use n8n_types::{ManagerError, Result};
use tracing::info;

pub fn backup_filename(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}_backup_{}.tar.gz", prefix, at.format("%Y%m%d_%H%M%S"))
}

/// Host path of the mount at `destination`
pub(crate) fn host_path_for(details: &ContainerDetails, destination: &str) -> Option<String> {
    details
        .mounts
        .iter()
        .find(|mount| mount.destination == destination)
        .and_then(|mount| mount.source.clone())
        .filter(|source| !source.is_empty())
}

fn archive_command(filename: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "tar czf /backup/{file} -C /source . && chmod 666 /backup/{file}",
            file = filename
        ),
    ]
}

impl AppManager {
    /// Archive the data volume into the backup directory and return the
    /// archive's file name.
    pub async fn backup_volume(&self) -> Result<String> {
        let settings = &self.config.backup;
        let filename = backup_filename(&settings.file_prefix, Local::now());

        let dashboard = self
            .engine
            .inspect_container(&settings.dashboard_container)
            .await?
            .ok_or_else(|| {
                ManagerError::Configuration(format!(
                    "Container {} not found; cannot locate the backup directory",
                    settings.dashboard_container
                ))
            })?;

        let host_path = host_path_for(&dashboard, &settings.mount_destination).ok_or_else(|| {
            ManagerError::Configuration(format!(
                "Could not find a mount at {} on {}. Ensure the backup directory is mounted.",
                settings.mount_destination, settings.dashboard_container
            ))
        })?;

        let helper = HelperSpec {
            image: settings.helper_image.clone(),
            command: archive_command(&filename),
            binds: vec![
                format!("{}:/source:ro", settings.data_volume),
                format!("{}:/backup:rw", host_path),
            ],
        };

        let exit_code = self
            .engine
            .run_helper(&helper)
            .await
            .map_err(|e| e.in_step("Create backup"))?;
        if exit_code != 0 {
            return Err(ManagerError::operation(
                "Create backup",
                format!("archive helper exited with status {}", exit_code),
            ));
        }

        info!("Backed up volume {} to {}/{}", settings.data_volume, host_path, filename);
        Ok(filename)
    }
}
