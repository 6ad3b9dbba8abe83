//! Dispatcher error types

use contracts::StoreError;
use thiserror::Error;

/// Errors that end the discovery loop
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Listing queues failed with a non-transient error
    #[error("queue discovery failed: {0}")]
    Discovery(#[from] StoreError),
}

impl DispatcherError {
    /// The underlying store error
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Discovery(e) => e,
        }
    }
}
