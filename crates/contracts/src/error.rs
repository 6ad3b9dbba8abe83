//! Layered error definitions
//!
//! Categorized by source: backing store / processing step

use thiserror::Error;

/// Errors from the ordered-log backing store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key has no value (e.g. a queue without stored configuration)
    #[error("{key} does not have any data")]
    NotFound { key: String },

    /// Connectivity problem; the connection is re-established underneath
    #[error("store connection error: {message}")]
    Connection { message: String },

    /// Stored value could not be decoded
    #[error("failed to decode '{key}': {message}")]
    Decode { key: String, message: String },

    /// Client was released and can no longer be used
    #[error("store client released")]
    Closed,

    /// Any other failure reported by the backend
    #[error("store error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether the failure is expected to clear once the connection recovers
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failure reported by the processing step for one entry
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The processor rejected or failed on the entry
    #[error("processing block {block_height} failed: {message}")]
    Failed { block_height: u64, message: String },

    /// Store access made by the processor failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessError {
    pub fn failed(block_height: u64, message: impl Into<String>) -> Self {
        Self::Failed {
            block_height,
            message: message.into(),
        }
    }
}
