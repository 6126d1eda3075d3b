use async_trait::async_trait;
use chrono::{DateTime, Utc};
use n8n_types::{ManagerError, RegistrySettings, Result};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

/// One tag as listed by the registry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagRecord {
    pub name: String,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl TagRecord {
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }
}

/// One page of the paginated tag listing
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TagPage {
    #[serde(default)]
    pub results: Vec<TagRecord>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Release metadata for the newest published release
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
}

/// Read-only access to the registry and release-metadata services
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Fetch a page of tags. `next` is the URL handed out by the previous
    /// page, `None` for the first one.
    async fn tags_page(&self, next: Option<&str>) -> Result<TagPage>;

    async fn latest_release(&self) -> Result<Release>;
}

/// reqwest-backed registry client
pub struct HttpRegistry {
    client: reqwest::Client,
    settings: RegistrySettings,
}

impl HttpRegistry {
    pub fn new(settings: RegistrySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.page_timeout())
            .build()
            .map_err(|e| ManagerError::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }
}

fn upstream(context: &str, error: reqwest::Error) -> ManagerError {
    ManagerError::Upstream(format!("{}: {}", context, error))
}

#[async_trait]
impl RegistryApi for HttpRegistry {
    async fn tags_page(&self, next: Option<&str>) -> Result<TagPage> {
        let request = match next {
            Some(url) => self.client.get(url),
            None => self
                .client
                .get(&self.settings.tags_url)
                .query(&[("page_size", self.settings.page_size)]),
        };
        debug!("Fetching tag page {}", next.unwrap_or(&self.settings.tags_url));

        request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| upstream("tag listing request failed", e))?
            .json::<TagPage>()
            .await
            .map_err(|e| upstream("tag listing response was not understood", e))
    }

    async fn latest_release(&self) -> Result<Release> {
        debug!("Fetching latest release from {}", self.settings.releases_url);

        self.client
            .get(&self.settings.releases_url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("n8n-manager/", env!("CARGO_PKG_VERSION")))
            .timeout(self.settings.release_timeout())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| upstream("release lookup failed", e))?
            .json::<Release>()
            .await
            .map_err(|e| upstream("release response was not understood", e))
    }
}
