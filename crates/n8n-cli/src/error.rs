use n8n_types::{ErrorKind, ErrorReport, ManagerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    ManagerError(#[from] ManagerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Structured form printed for `--format json`
    pub fn report(&self) -> ErrorReport {
        match self {
            CliError::ManagerError(e) => e.report(),
            CliError::ConfigError(message) => ErrorReport {
                kind: ErrorKind::Configuration,
                message: message.clone(),
            },
            other => ErrorReport {
                kind: ErrorKind::Operation,
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
