//! Error taxonomy shared across crates

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type
pub type Result<T> = std::result::Result<T, ManagerError>;

/// Errors surfaced by manager operations
#[derive(Error, Debug)]
pub enum ManagerError {
    /// The container engine could not be reached
    #[error("Docker connection failed: {0}")]
    Connection(String),

    /// The managed container (or another named engine object) does not exist
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Registry or release-metadata HTTP failure
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// A version string is not valid semver
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// The requested image tag could not be pulled
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// A required host path or setting could not be resolved
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rollback needs at least two local images
    #[error("No previous version found locally ({found} image(s) available)")]
    InsufficientHistory { found: usize },

    /// Every local image carries the running version
    #[error("Already running version {0}. Cannot rollback to the same version.")]
    NoDistinctVersion(String),

    /// Another upgrade holds the lock for this container
    #[error("Upgrade already in progress for {0}")]
    UpgradeInProgress(String),

    /// Generic failure of one step of a multi-step operation
    #[error("{operation} failed: {message}")]
    Operation { operation: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    NotFound,
    Upstream,
    InvalidVersion,
    ImageNotFound,
    Configuration,
    InsufficientHistory,
    NoDistinctVersion,
    UpgradeInProgress,
    Operation,
}

/// Structured error as handed to the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ManagerError {
    pub fn operation(operation: impl Into<String>, message: impl ToString) -> Self {
        ManagerError::Operation {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Connection(_) => ErrorKind::Connection,
            ManagerError::NotFound(_) => ErrorKind::NotFound,
            ManagerError::Upstream(_) => ErrorKind::Upstream,
            ManagerError::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            ManagerError::ImageNotFound(_) => ErrorKind::ImageNotFound,
            ManagerError::Configuration(_) => ErrorKind::Configuration,
            ManagerError::InsufficientHistory { .. } => ErrorKind::InsufficientHistory,
            ManagerError::NoDistinctVersion(_) => ErrorKind::NoDistinctVersion,
            ManagerError::UpgradeInProgress(_) => ErrorKind::UpgradeInProgress,
            ManagerError::Operation { .. }
            | ManagerError::Io(_)
            | ManagerError::Serialization(_) => ErrorKind::Operation,
        }
    }

    /// Attach the name of the failing step.
    ///
    /// Typed failures (missing image, lock held, ...) keep their kind so
    /// callers can still match on them; only untyped failures are rewrapped.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            ManagerError::Operation { message, .. } => ManagerError::Operation {
                operation: step.to_string(),
                message,
            },
            ManagerError::Io(e) => ManagerError::operation(step, e),
            ManagerError::Serialization(e) => ManagerError::operation(step, e),
            other => other,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<&ManagerError> for ErrorReport {
    fn from(error: &ManagerError) -> Self {
        error.report()
    }
}
