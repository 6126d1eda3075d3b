use crate::api::{RegistryApi, TagPage};
use n8n_types::{release_version, strip_release_prefixes, ManagerError, RegistrySettings, Result, VersionEntry};
use semver::Version;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stable releases published upstream, newest first.
///
/// # Examples
///
/// ```rust,no_run
/// use n8n_registry::{HttpRegistry, VersionCatalog};
/// use n8n_types::RegistrySettings;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = RegistrySettings::default();
/// let catalog = VersionCatalog::new(HttpRegistry::new(settings.clone())?, settings);
///
/// for entry in catalog.list_available_versions(20).await? {
///     println!("{}{}", entry.version, if entry.is_latest { " (latest)" } else { "" });
/// }
/// # Ok(())
/// # }
/// ```
pub struct VersionCatalog<R> {
    api: R,
    settings: RegistrySettings,
    retry_backoff: Duration,
}

impl<R: RegistryApi> VersionCatalog<R> {
    pub fn new(api: R, settings: RegistrySettings) -> Self {
        Self {
            api,
            settings,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Base delay between retries of a failed page; grows linearly per attempt.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub async fn list_available_versions(&self, limit: usize) -> Result<Vec<VersionEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let latest = self.latest_production_version().await;

        let mut collected: Vec<(Version, VersionEntry)> = Vec::new();
        let mut seen = HashSet::new();
        let mut next: Option<String> = None;

        'pages: loop {
            let page = self.fetch_page(next.as_deref()).await?;

            for tag in &page.results {
                let Some(version) = release_version(&tag.name) else {
                    continue;
                };
                if !seen.insert(tag.name.clone()) {
                    continue;
                }

                collected.push((
                    version,
                    VersionEntry {
                        version: tag.name.clone(),
                        updated_at: tag.updated_at(),
                        is_latest: false,
                    },
                ));

                if collected.len() >= limit {
                    break 'pages;
                }
            }

            match page.next {
                Some(url) if !url.is_empty() => next = Some(url),
                _ => break,
            }
        }

        collected.sort_by(|a, b| b.0.cmp(&a.0));

        let mut entries: Vec<VersionEntry> = collected.into_iter().map(|(_, entry)| entry).collect();
        if let Some(latest) = latest {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.version == latest) {
                entry.is_latest = true;
            }
        }
        entries.truncate(limit);

        info!("Collected {} release(s) from the registry", entries.len());
        Ok(entries)
    }

    /// Latest non-prerelease release tag, prefixes stripped. Best effort.
    async fn latest_production_version(&self) -> Option<String> {
        match self.api.latest_release().await {
            Ok(release) if release.prerelease => {
                debug!("Latest release {} is a prerelease, not marking it", release.tag_name);
                None
            }
            Ok(release) => {
                let version = strip_release_prefixes(&release.tag_name, &self.settings.release_tag_prefixes);
                (!version.is_empty()).then(|| version.to_string())
            }
            Err(e) => {
                warn!("Continuing without latest release marker: {}", e);
                None
            }
        }
    }

    async fn fetch_page(&self, next: Option<&str>) -> Result<TagPage> {
        let mut attempt = 0;
        loop {
            match self.api.tags_page(next).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.settings.page_retries => {
                    attempt += 1;
                    warn!("Tag page request failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    return Err(ManagerError::Upstream(format!(
                        "Failed to fetch versions after {} attempt(s): {}",
                        attempt + 1,
                        e
                    )))
                }
            }
        }
    }
}
