//! Error types for the app connector
//!
//! Collaborators report failures through [`Error`]. The engine itself never
//! surfaces these from its mutating operations; it logs them and leaves the
//! affected routes as they were.

use thiserror::Error;

/// Result type alias for app connector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the app connector
#[derive(Error, Debug)]
pub enum Error {
    /// Route advertiser failures (advertise/unadvertise)
    #[error("Route advertiser error: {0}")]
    RouteAdvertiser(String),

    /// Route info store failures (read/update/flush)
    #[error("Route store error: {0}")]
    RouteStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a route advertiser error
    pub fn route_advertiser(msg: impl Into<String>) -> Self {
        Self::RouteAdvertiser(msg.into())
    }

    /// Create a route store error
    pub fn route_store(msg: impl Into<String>) -> Self {
        Self::RouteStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
