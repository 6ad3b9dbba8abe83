//! Error types for CLI operations.

use contracts::StoreError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Option value rejected before startup
    #[error("Invalid value for --{name}: {message}")]
    InvalidArgument { name: String, message: String },

    /// Redis connection could not be established
    #[error("Failed to connect to Redis: {0}")]
    StoreConnection(#[source] StoreError),
}

impl CliError {
    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }
}
