//! Error types for the dnswatch system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for dnswatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dnswatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Subscribing to the network observer failed
    #[error("Registration failed: {0}")]
    Registration(String),

    /// DNS discovery failed (one strategy, or the whole pipeline)
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Property store lookup errors
    #[error("Property store error: {0}")]
    PropertyStore(String),

    /// Network observer errors (snapshot, unregister)
    #[error("Network observer error: {0}")]
    Observer(String),

    /// Carrier information errors
    #[error("Carrier info error: {0}")]
    Carrier(String),

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
    /// Create a registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a property store error
    pub fn property_store(msg: impl Into<String>) -> Self {
        Self::PropertyStore(msg.into())
    }

    /// Create a network observer error
    pub fn observer(msg: impl Into<String>) -> Self {
        Self::Observer(msg.into())
    }

    /// Create a carrier info error
    pub fn carrier(msg: impl Into<String>) -> Self {
        Self::Carrier(msg.into())
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
