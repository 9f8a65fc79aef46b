//! Loader error types.

use thiserror::Error;

/// Errors that can occur while registering or loading resources.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A resource with this id is already registered.
    #[error("Resource already registered: {0}")]
    DuplicateResource(String),

    /// No resource with this id is registered.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Every remote location failed and no local copy could be used.
    #[error("All sources failed for resource {id}: {}", .attempts.join("; "))]
    AllSourcesFailed { id: String, attempts: Vec<String> },

    /// The bundled fallback snapshot could not be read.
    #[error("Fallback failed for resource {id}: {reason}")]
    FallbackFailed { id: String, reason: String },

    /// A single fetch failed.
    #[error("Fetch of {location} failed: {reason}")]
    Fetch { location: String, reason: String },

    /// The location uses a scheme the fetcher cannot read.
    #[error("Unsupported location scheme: {0}")]
    UnsupportedScheme(String),

    /// The update policy string is not recognized.
    #[error("Invalid update policy: {0}")]
    InvalidPolicy(String),

    /// Schedule properties could not be parsed.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Configuration is inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The registry has been shut down.
    #[error("Loader registry is shut down")]
    ShutDown,

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LoaderError {
    /// Check if a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoaderError::AllSourcesFailed { .. }
                | LoaderError::Fetch { .. }
                | LoaderError::Http(_)
                | LoaderError::Io(_)
        )
    }
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
