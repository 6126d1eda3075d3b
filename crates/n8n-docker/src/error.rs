use bollard::errors::Error as BollardError;
use n8n_types::ManagerError;

pub(crate) fn is_not_found(error: &BollardError) -> bool {
    matches!(error, BollardError::DockerResponseServerError { status_code: 404, .. })
}

pub(crate) fn is_not_modified(error: &BollardError) -> bool {
    matches!(error, BollardError::DockerResponseServerError { status_code: 304, .. })
}

fn is_unreachable(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::IOError { .. }
            | BollardError::HyperLegacyError { .. }
            | BollardError::HyperResponseError { .. }
            | BollardError::RequestTimeoutError
    )
}

/// Map an engine API error onto the manager's taxonomy
pub(crate) fn engine_error(operation: &str, error: BollardError) -> ManagerError {
    if is_unreachable(&error) {
        return ManagerError::Connection(format!(
            "{}: {}. Make sure the Docker daemon is running.",
            operation, error
        ));
    }
    match error {
        BollardError::DockerResponseServerError { status_code: 404, message } => ManagerError::NotFound(message),
        other => ManagerError::operation(operation, other),
    }
}

/// Pull failures for a tag that does not exist upstream become `ImageNotFound`
pub(crate) fn pull_error(reference: &str, error: BollardError) -> ManagerError {
    let missing = match &error {
        BollardError::DockerResponseServerError { status_code: 404, .. } => true,
        BollardError::DockerResponseServerError { message, .. } => mentions_missing(message),
        BollardError::DockerStreamError { error } => mentions_missing(error),
        _ => false,
    };

    match error {
        BollardError::DockerStreamError { error } if missing => {
            ManagerError::ImageNotFound(format!("{} ({})", reference, error))
        }
        BollardError::DockerResponseServerError { message, .. } if missing => {
            ManagerError::ImageNotFound(format!("{} ({})", reference, message))
        }
        BollardError::DockerStreamError { error } => {
            ManagerError::operation("Pull image", format!("{}: {}", reference, error))
        }
        other => engine_error("Pull image", other),
    }
}

fn mentions_missing(message: &str) -> bool {
    let text = message.to_lowercase();
    text.contains("not found") || text.contains("manifest unknown")
}
