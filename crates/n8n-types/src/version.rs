//! Semantic-version policy: which registry tags count as releases and how
//! risky a jump between two versions is.

use crate::error::{ManagerError, Result};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A release available upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_latest: bool,
}

const FLOATING_TAGS: &[&str] = &["latest", "next"];
const ARCH_SUFFIXES: &[&str] = &["-amd64", "-arm64"];
const PRERELEASE_MARKERS: &[&str] = &[
    "-exp.", "-exp", ".exp", "-alpha", "-beta", "-rc", ".alpha", ".beta", ".rc",
];

/// Why a registry tag was not accepted as a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRejection {
    Floating,
    Architecture,
    PrereleaseMarker,
    NotSemver,
    Prerelease,
}

/// Apply the release filter to a registry tag, in order: floating tags,
/// architecture suffixes, pre-release markers, semver parse, pre-release
/// component.
pub fn classify_tag(tag: &str) -> std::result::Result<Version, TagRejection> {
    if FLOATING_TAGS.contains(&tag) {
        return Err(TagRejection::Floating);
    }
    if ARCH_SUFFIXES.iter().any(|arch| tag.contains(arch)) {
        return Err(TagRejection::Architecture);
    }
    let lowered = tag.to_lowercase();
    if PRERELEASE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Err(TagRejection::PrereleaseMarker);
    }
    let version = Version::parse(tag).map_err(|_| TagRejection::NotSemver)?;
    if !version.pre.is_empty() {
        return Err(TagRejection::Prerelease);
    }
    Ok(version)
}

/// Release version for a tag, or `None` if the tag is filtered out
pub fn release_version(tag: &str) -> Option<Version> {
    classify_tag(tag).ok()
}

/// Strip known release-tag prefixes, each at most once and in order
/// (`n8n@1.2.3` then `v1.2.3` both become `1.2.3`).
pub fn strip_release_prefixes<'a>(tag: &'a str, prefixes: &[String]) -> &'a str {
    prefixes
        .iter()
        .fold(tag, |acc, prefix| acc.strip_prefix(prefix.as_str()).unwrap_or(acc))
}

pub fn parse_version(version: &str) -> Result<Version> {
    Version::parse(version).map_err(|e| ManagerError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// Severity of a pre-upgrade warning, decided when it is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Risk,
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeWarning {
    pub severity: WarningSeverity,
    pub message: String,
}

impl UpgradeWarning {
    pub fn risk(message: impl Into<String>) -> Self {
        Self {
            severity: WarningSeverity::Risk,
            message: message.into(),
        }
    }

    pub fn advisory(message: impl Into<String>) -> Self {
        Self {
            severity: WarningSeverity::Advisory,
            message: message.into(),
        }
    }

    pub fn is_risk(&self) -> bool {
        self.severity == WarningSeverity::Risk
    }
}

impl fmt::Display for UpgradeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreUpgradeReport {
    pub safe: bool,
    pub warnings: Vec<UpgradeWarning>,
}

impl PreUpgradeReport {
    /// A report is safe unless at least one warning is a risk.
    pub fn from_warnings(warnings: Vec<UpgradeWarning>) -> Self {
        Self {
            safe: !warnings.iter().any(UpgradeWarning::is_risk),
            warnings,
        }
    }
}

/// Minor-version gap above which an incremental upgrade is suggested
pub const LARGE_MINOR_GAP: u64 = 10;

/// Compare the running version against a target and collect warnings.
pub fn evaluate_upgrade(current: Option<&str>, target: &str) -> Result<PreUpgradeReport> {
    let current_raw = match current {
        Some(version) if !version.is_empty() && version != crate::UNKNOWN_VERSION => version,
        _ => {
            return Ok(PreUpgradeReport::from_warnings(vec![UpgradeWarning::advisory(
                "Current version unknown, proceeding with caution",
            )]))
        }
    };

    let current = parse_version(current_raw)?;
    let target_version = parse_version(target)?;
    let mut warnings = Vec::new();

    if target_version.major > current.major {
        warnings.push(UpgradeWarning::risk(format!(
            "Major version jump detected: {} -> {}. Please review the release notes for breaking changes.",
            current_raw, target
        )));
    }

    if target_version.major == current.major && target_version.minor > current.minor {
        let minor_gap = target_version.minor - current.minor;
        if minor_gap > LARGE_MINOR_GAP {
            warnings.push(UpgradeWarning::advisory(format!(
                "Large version gap detected ({} minor versions). Consider incremental upgrades.",
                minor_gap
            )));
        }
    }

    if target_version < current {
        warnings.push(UpgradeWarning::risk(format!(
            "Downgrading from {} to {}. This may cause data compatibility issues.",
            current_raw, target
        )));
    }

    Ok(PreUpgradeReport::from_warnings(warnings))
}
