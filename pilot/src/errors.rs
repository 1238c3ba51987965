//! Error types for catpilot

use thiserror::Error;

/// Main error type for catpilot
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Pattern error: {0}")]
    PatternError(#[from] regex::Error),

    /// Installation paths could not be resolved
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Strategy precondition unmet or compiler/toolchain failure
    #[error("Build error: {0}")]
    BuildError(String),

    /// Deployment target is locked by another process
    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    /// Management request rejected
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Port or XML patch failed and was rolled back
    #[error("Port configuration error: {0}")]
    PortConfigError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Message fragments that indicate a file is held open by another process
const BUSY_MARKERS: &[&str] = &[
    "ebusy",
    "resource busy",
    "device or resource busy",
    "being used by another process",
    "text file busy",
];

impl PilotError {
    /// Whether the failure is lock contention on the deployment target.
    pub fn is_resource_busy(&self) -> bool {
        match self {
            PilotError::ResourceBusy(_) => true,
            PilotError::IoError(e) => is_busy_io(e),
            other => {
                let message = other.to_string().to_lowercase();
                BUSY_MARKERS.iter().any(|marker| message.contains(marker))
            }
        }
    }
}

/// EBUSY on unix, ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION on windows
pub fn is_busy_io(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::ResourceBusy {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(16) {
        return true;
    }
    #[cfg(windows)]
    if matches!(err.raw_os_error(), Some(32) | Some(33)) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    BUSY_MARKERS.iter().any(|marker| message.contains(marker))
}
