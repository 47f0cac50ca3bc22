//! Error types shared by the infrastructure layer

use thiserror::Error;

/// Result alias for infrastructure operations
pub type Result<T> = std::result::Result<T, InfraError>;

/// Errors raised while configuring shared infrastructure
#[derive(Debug, Error)]
pub enum InfraError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A global subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
