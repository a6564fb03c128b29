//! Error types for the network interface manager
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for NIM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the NIM system
#[derive(Error, Debug)]
pub enum Error {
    /// Reachability probe errors
    #[error("Probe error: {0}")]
    Probe(String),

    /// Interface provisioning errors (DHCP client, wireless, addresses)
    #[error("Provisioning error: {0}")]
    Provision(String),

    /// Publication errors (pub/sub collaborator, persisted state)
    #[error("Publish error: {0}")]
    Publish(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a provisioning error
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::probe("no route").to_string(),
            "Probe error: no route"
        );
        assert_eq!(
            Error::config("bad interval").to_string(),
            "Configuration error: bad interval"
        );
    }

    #[test]
    fn test_from_anyhow() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert!(matches!(err, Error::Other(ref m) if m == "boom"));
    }
}
