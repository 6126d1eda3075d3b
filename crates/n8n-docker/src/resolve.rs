//! Resolution of floating image tags to concrete versions

use crate::engine::ImageDetails;
use n8n_types::ContainerSettings;

/// One way of recovering a concrete version from an image
pub trait VersionStrategy: Send + Sync {
    fn resolve(&self, image: &ImageDetails) -> Option<String>;
}

/// Reads the first non-empty label among `keys`
pub struct LabelStrategy {
    keys: Vec<String>,
}

impl LabelStrategy {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

impl VersionStrategy for LabelStrategy {
    fn resolve(&self, image: &ImageDetails) -> Option<String> {
        self.keys
            .iter()
            .filter_map(|key| image.labels.get(key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }
}

/// Looks for another tag on the same image that reads like a version number
pub struct SiblingTagStrategy {
    floating_tag: String,
}

impl SiblingTagStrategy {
    pub fn new(floating_tag: impl Into<String>) -> Self {
        Self {
            floating_tag: floating_tag.into(),
        }
    }
}

fn looks_numeric(tag: &str) -> bool {
    let digits: String = tag.chars().filter(|c| *c != '.' && *c != '-').collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

impl VersionStrategy for SiblingTagStrategy {
    fn resolve(&self, image: &ImageDetails) -> Option<String> {
        image
            .repo_tags
            .iter()
            .filter_map(|repo_tag| repo_tag.rsplit_once(':'))
            .map(|(_, tag)| tag)
            .find(|tag| *tag != self.floating_tag && looks_numeric(tag))
            .map(str::to_string)
    }
}

/// Ordered chain of strategies; the first answer wins
pub struct VersionResolver {
    image_name: String,
    floating_tag: String,
    strategies: Vec<Box<dyn VersionStrategy>>,
}

impl VersionResolver {
    pub fn new(image_name: impl Into<String>, floating_tag: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            floating_tag: floating_tag.into(),
            strategies: Vec::new(),
        }
    }

    /// Labels first, then sibling tags
    pub fn from_settings(settings: &ContainerSettings) -> Self {
        Self::new(&settings.image, &settings.floating_tag)
            .with_strategy(LabelStrategy::new(settings.version_labels.clone()))
            .with_strategy(SiblingTagStrategy::new(&settings.floating_tag))
    }

    pub fn with_strategy(mut self, strategy: impl VersionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn floating_tag(&self) -> &str {
        &self.floating_tag
    }

    /// Tag of the first repo tag belonging to the managed image
    pub fn matching_tag<'a>(&self, repo_tags: &'a [String]) -> Option<&'a str> {
        repo_tags
            .iter()
            .filter_map(|repo_tag| repo_tag.rsplit_once(':'))
            .find(|(repository, _)| self.matches_repository(repository))
            .map(|(_, tag)| tag)
    }

    fn matches_repository(&self, repository: &str) -> bool {
        repository == self.image_name
            || repository
                .strip_suffix(self.image_name.as_str())
                .is_some_and(|prefix| prefix.ends_with('/'))
    }

    /// Run the strategy chain
    pub fn resolve_floating(&self, image: &ImageDetails) -> Option<String> {
        self.strategies.iter().find_map(|strategy| strategy.resolve(image))
    }

    /// Version of an image as seen through its managed tag.
    ///
    /// `None` when the image carries no tag of the managed repository.
    /// Floating tags that nothing resolves are returned as-is.
    pub fn version_of(&self, image: &ImageDetails) -> Option<String> {
        let tag = self.matching_tag(&image.repo_tags)?;
        if tag == self.floating_tag {
            Some(self.resolve_floating(image).unwrap_or_else(|| tag.to_string()))
        } else {
            Some(tag.to_string())
        }
    }
}
