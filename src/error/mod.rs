//! Error handling module for the gateway

use thiserror::Error;

/// Custom error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Raised before any analysis attempt when the vision API has no key.
    /// Never converted into a fallback analysis result.
    #[error("{0} is not configured for analysis.")]
    MissingCredentials(String),
}

/// Result type for the gateway
pub type Result<T> = std::result::Result<T, Error>;
