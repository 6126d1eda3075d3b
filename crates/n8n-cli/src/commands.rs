use crate::{cli::OutputFormat, utils::display, Result};
use indicatif::{ProgressBar, ProgressStyle};
use n8n_docker::{AppManager, DockerEngine, RecoveryOutcome};
use n8n_registry::{HttpRegistry, VersionCatalog};
use n8n_types::{AppConfig, ContainerStatus, LocalImage, PreUpgradeReport, VersionEntry, WarningSeverity};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

/// Outcome of `upgrade`, mirroring the dashboard's update response
#[derive(Debug, Serialize)]
pub struct UpgradeSummary {
    pub success: bool,
    pub backup_filename: Option<String>,
    pub container_id: String,
}

pub struct CommandHandler {
    manager: AppManager,
    catalog: VersionCatalog<HttpRegistry>,
    output_format: OutputFormat,
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

impl CommandHandler {
    pub fn new(config: AppConfig) -> Result<Self> {
        let engine = DockerEngine::connect(&config.docker)?;
        let catalog = VersionCatalog::new(HttpRegistry::new(config.registry.clone())?, config.registry.clone());

        Ok(Self {
            manager: AppManager::new(Arc::new(engine), config),
            catalog,
            output_format: OutputFormat::Table,
        })
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub async fn show_status(&self) -> Result<()> {
        let status = self.manager.get_status().await?;
        match self.output_format {
            OutputFormat::Json => self.print_json(&status),
            OutputFormat::Table => {
                println!("{}", Table::new(status_rows(&status)));
                Ok(())
            }
            OutputFormat::Plain => {
                for row in status_rows(&status) {
                    println!("{}: {}", row.field, row.value);
                }
                Ok(())
            }
        }
    }

    pub async fn list_versions(&self, limit: usize) -> Result<()> {
        let pb = spinner("Fetching versions from the registry...");
        let result = self.catalog.list_available_versions(limit).await;
        pb.finish_and_clear();
        let versions = result?;

        match self.output_format {
            OutputFormat::Json => self.print_json(&versions),
            OutputFormat::Table => {
                println!("{}", Table::new(versions.iter().map(VersionRow::from)));
                Ok(())
            }
            OutputFormat::Plain => {
                for entry in &versions {
                    let marker = if entry.is_latest { " (latest)" } else { "" };
                    println!("{}{}", entry.version, marker);
                }
                Ok(())
            }
        }
    }

    pub async fn list_images(&self) -> Result<()> {
        let images = self.manager.list_local_images().await?;
        match self.output_format {
            OutputFormat::Json => self.print_json(&images),
            OutputFormat::Table => {
                println!("{}", Table::new(images.iter().map(ImageRow::from)));
                Ok(())
            }
            OutputFormat::Plain => {
                for image in &images {
                    println!("{} {}", image.version, image.created_at.to_rfc3339());
                }
                Ok(())
            }
        }
    }

    pub async fn check_upgrade(&self, version: &str) -> Result<()> {
        let report = self.manager.check_upgrade(version).await?;
        match self.output_format {
            OutputFormat::Json => self.print_json(&report),
            _ => {
                print_report(version, &report);
                Ok(())
            }
        }
    }

    pub async fn backup(&self) -> Result<()> {
        let pb = spinner("Creating backup...");
        let result = self.manager.backup_volume().await;
        pb.finish_and_clear();
        let filename = result?;

        match self.output_format {
            OutputFormat::Json => self.print_json(&serde_json::json!({ "success": true, "filename": filename })),
            _ => {
                display::success(&format!("Backup created: {}", filename));
                Ok(())
            }
        }
    }

    /// Back up (unless skipped), then upgrade
    pub async fn upgrade(&self, version: &str, no_backup: bool) -> Result<()> {
        let pb = spinner("Preparing upgrade...");

        let backup_filename = if no_backup {
            None
        } else {
            pb.set_message("Creating backup...");
            match self.manager.backup_volume().await {
                Ok(filename) => Some(filename),
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e.into());
                }
            }
        };

        let sink = |message: &str| pb.set_message(message.to_string());
        let result = self.manager.upgrade_to(version, &sink).await;
        pb.finish_and_clear();
        let container_id = result?;

        let summary = UpgradeSummary {
            success: true,
            backup_filename,
            container_id,
        };
        match self.output_format {
            OutputFormat::Json => self.print_json(&summary),
            _ => {
                if let Some(filename) = &summary.backup_filename {
                    display::info(&format!("Backup: {}", filename));
                }
                display::success(&format!("Upgraded to {} (container {})", version, short_id(&summary.container_id)));
                Ok(())
            }
        }
    }

    pub async fn rollback(&self) -> Result<()> {
        let pb = spinner("Rolling back...");
        let sink = |message: &str| pb.set_message(message.to_string());
        let result = self.manager.rollback_to_previous(&sink).await;
        pb.finish_and_clear();
        let container_id = result?;

        match self.output_format {
            OutputFormat::Json => {
                self.print_json(&serde_json::json!({ "success": true, "container_id": container_id }))
            }
            _ => {
                display::success(&format!("Rolled back (container {})", short_id(&container_id)));
                Ok(())
            }
        }
    }

    pub async fn control(&self, action: &str) -> Result<()> {
        match action {
            "start" => self.manager.start_container().await?,
            "stop" => self.manager.stop_container().await?,
            "restart" => self.manager.restart_container().await?,
            other => return Err(crate::CliError::InvalidInput(format!("unknown action '{}'", other))),
        }

        match self.output_format {
            OutputFormat::Json => self.print_json(&serde_json::json!({ "success": true, "action": action })),
            _ => {
                display::success(&format!("Container {}: {} done", self.manager.container_name(), action));
                Ok(())
            }
        }
    }

    pub async fn recover(&self, force: bool) -> Result<()> {
        if force && self.manager.release_stale_lock()? {
            display::warning("Removed a stale upgrade lock");
        }

        let outcome = self.manager.recover().await?;
        match self.output_format {
            OutputFormat::Json => self.print_json(&outcome),
            _ => {
                match &outcome {
                    RecoveryOutcome::NoCheckpoint => display::info("No interrupted upgrade recorded"),
                    RecoveryOutcome::NothingToRecover => {
                        display::info("Container exists; discarded the stale upgrade checkpoint")
                    }
                    RecoveryOutcome::Restarted { container_id } => display::success(&format!(
                        "Started container {} left stopped by the interrupted upgrade",
                        short_id(container_id)
                    )),
                    RecoveryOutcome::Recreated { container_id, image } => display::success(&format!(
                        "Recreated container {} from {}",
                        short_id(container_id),
                        image
                    )),
                }
                Ok(())
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[derive(Tabled)]
pub struct StatusRow {
    pub field: &'static str,
    pub value: String,
}

pub fn status_rows(status: &ContainerStatus) -> Vec<StatusRow> {
    let row = |field, value: String| StatusRow { field, value };
    vec![
        row("Status", status.status.to_string()),
        row("Version", display::format_optional(status.current_version.as_deref())),
        row(
            "Started",
            display::format_optional(status.started_at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC"))),
        ),
        row("Health", display::format_optional(status.health.as_ref())),
        row("CPU %", display::format_optional(status.cpu_percent)),
        row("Memory", display::format_optional(status.memory_usage.map(display::format_bytes))),
        row("Memory limit", display::format_optional(status.memory_limit.map(display::format_bytes))),
        row("Memory %", display::format_optional(status.memory_percent)),
    ]
}

#[derive(Tabled)]
struct VersionRow {
    version: String,
    updated: String,
    latest: &'static str,
}

impl From<&VersionEntry> for VersionRow {
    fn from(entry: &VersionEntry) -> Self {
        Self {
            version: entry.version.clone(),
            updated: display::format_optional(entry.updated_at.map(|t| t.format("%Y-%m-%d"))),
            latest: if entry.is_latest { "yes" } else { "" },
        }
    }
}

#[derive(Tabled)]
struct ImageRow {
    version: String,
    created: String,
}

impl From<&LocalImage> for ImageRow {
    fn from(image: &LocalImage) -> Self {
        Self {
            version: image.version.clone(),
            created: image.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn print_report(version: &str, report: &PreUpgradeReport) {
    if report.safe {
        display::success(&format!("Upgrade to {} looks safe", version));
    } else {
        display::warning(&format!("Upgrade to {} carries risks", version));
    }
    for warning in &report.warnings {
        let label = match warning.severity {
            WarningSeverity::Risk => "risk",
            WarningSeverity::Advisory => "advisory",
        };
        println!("  [{}] {}", label, warning.message);
    }
}
