//! Error types for the Bender relay.

use thiserror::Error;

/// Result type alias using the Bender error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Bender services.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (credentials, API key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client failed authentication
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed inbound request
    #[error("Validation error: {0}")]
    Validation(String),

    /// The Claude Code executable is missing
    #[error("Assistant unavailable: {0}")]
    AssistantUnavailable(String),

    /// Assistant invocation exceeded its time bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Assistant process failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Chat platform rejected a message post
    #[error("Upstream post failed: {0}")]
    UpstreamPost(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this is a configuration error.
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Validation(_) => 422,
            Self::Config(_) | Self::AssistantUnavailable(_) => 503,
            Self::UpstreamPost(_) => 502,
            _ => 500,
        }
    }
}
