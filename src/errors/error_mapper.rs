use facetdash_core::{FetchError, LoadError};

/// Map backend errors to user-friendly messages
/// Returns (title, message, details)
pub fn map_fetch_error(error: &FetchError) -> (String, String, String) {
    match error {
        FetchError::Transport { url, source } => {
            let details = if source.is_connect() {
                format!("Could not connect to {}.\n\nCheck that the backend is running and the URL is correct.", url)
            } else if source.is_timeout() {
                format!("The request to {} timed out.", url)
            } else {
                error.to_string()
            };
            (
                "Backend Unreachable".to_string(),
                "The aggregate is unavailable. Retry once the backend is reachable.".to_string(),
                details,
            )
        }
        FetchError::Status { status, .. } if *status == 404 => (
            "Endpoint Not Found".to_string(),
            "The backend does not serve this endpoint.".to_string(),
            format!("{}\n\nThe base URL may point at the wrong service.", error),
        ),
        FetchError::Status { status, .. } if *status >= 500 => (
            "Backend Error".to_string(),
            "The backend failed while serving a page. The aggregate is unavailable.".to_string(),
            error.to_string(),
        ),
        FetchError::Status { .. } => (
            "Request Rejected".to_string(),
            "The backend rejected the request.".to_string(),
            error.to_string(),
        ),
        FetchError::Malformed { .. } => (
            "Unreadable Response".to_string(),
            "The backend returned a response that could not be parsed. The aggregate is unavailable.".to_string(),
            error.to_string(),
        ),
        FetchError::Unavailable(reason) => (
            "Aggregate Unavailable".to_string(),
            "The aggregate could not be produced.".to_string(),
            reason.clone(),
        ),
    }
}

/// Map dataset/taxonomy loading errors to user-friendly messages
/// Returns (title, message, details)
pub fn map_load_error(error: &LoadError) -> (String, String, String) {
    match error {
        LoadError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => (
            "File Not Found".to_string(),
            "The file could not be found.".to_string(),
            format!(
                "Path: {}\n\nPlease verify the file exists and you have permission to read it.",
                path
            ),
        ),
        LoadError::Io { path, source }
            if source.kind() == std::io::ErrorKind::PermissionDenied =>
        {
            (
                "Permission Denied".to_string(),
                "Permission denied.".to_string(),
                format!("You don't have permission to read this file:\n{}", path),
            )
        }
        LoadError::Io { .. } => (
            "Error Loading File".to_string(),
            "Failed to read the file.".to_string(),
            error.to_string(),
        ),
        LoadError::Json { .. } => (
            "Invalid File".to_string(),
            "The file is not valid JSON in the expected shape.".to_string(),
            error.to_string(),
        ),
    }
}
