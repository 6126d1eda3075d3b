//! Status inspection of the managed container

use crate::engine::{ContainerDetails, StatsSample};
use crate::manager::AppManager;
use chrono::{DateTime, Utc};
use n8n_types::{ContainerStatus, Health, Result, RunState, UNKNOWN_VERSION};
use tracing::{debug, warn};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// CPU usage over the last sampling interval, in percent of one core times
/// the number of cores.
///
/// `None` when either counter did not advance.
pub fn cpu_percent(sample: &StatsSample) -> Option<f64> {
    let cpu_delta = sample.cpu_total.checked_sub(sample.precpu_total)?;
    let system_delta = sample.system_cpu?.checked_sub(sample.presystem_cpu.unwrap_or(0))?;
    if cpu_delta == 0 || system_delta == 0 {
        return None;
    }

    let num_cpus = sample.percpu_count.max(1) as f64;
    Some(round2((cpu_delta as f64 / system_delta as f64) * num_cpus * 100.0))
}

pub fn memory_percent(usage: u64, limit: u64) -> Option<f64> {
    if limit == 0 {
        return None;
    }
    Some(round2(usage as f64 / limit as f64 * 100.0))
}

fn parse_started_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw?).ok()?.with_timezone(&Utc);
    // The engine reports the zero time for containers that never started
    (parsed.timestamp() > 0).then_some(parsed)
}

impl AppManager {
    /// Current state of the managed container.
    ///
    /// A missing container is reported as `not_found`, not as an error.
    pub async fn get_status(&self) -> Result<ContainerStatus> {
        let name = self.container_name();
        let details = match self.engine.inspect_container(name).await? {
            Some(details) => details,
            None => {
                debug!("Container {} not found", name);
                return Ok(ContainerStatus::not_found());
            }
        };

        let state = RunState::from(details.state.status.as_str());
        let mut status = ContainerStatus {
            status: state,
            current_version: Some(self.running_version(&details).await),
            started_at: parse_started_at(details.state.started_at.as_deref()),
            health: Some(Health::infer(details.state.health.as_deref(), state)),
            cpu_percent: None,
            memory_usage: None,
            memory_limit: None,
            memory_percent: None,
        };

        if state.is_running() {
            match self.engine.stats(name).await {
                Ok(sample) => {
                    status.cpu_percent = cpu_percent(&sample);
                    status.memory_usage = sample.memory_usage;
                    status.memory_limit = sample.memory_limit;
                    status.memory_percent = match (sample.memory_usage, sample.memory_limit) {
                        (Some(usage), Some(limit)) => memory_percent(usage, limit),
                        _ => None,
                    };
                }
                Err(e) => warn!("Could not read stats for {}: {}", name, e),
            }
        }

        Ok(status)
    }

    /// Version of the image behind a container, `unknown` when unresolved
    pub(crate) async fn running_version(&self, details: &ContainerDetails) -> String {
        let image = match self.engine.inspect_image(&details.image_id).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Could not inspect image {}: {}", details.image_id, e);
                return UNKNOWN_VERSION.to_string();
            }
        };

        match self.resolver.matching_tag(&image.repo_tags) {
            Some(tag) if tag == self.resolver.floating_tag() => self
                .resolver
                .resolve_floating(&image)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            Some(tag) => tag.to_string(),
            None => UNKNOWN_VERSION.to_string(),
        }
    }
}
