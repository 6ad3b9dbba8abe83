//! # Contracts
//!
//! Shared interface contracts: data types, error taxonomy and the traits
//! that connect the store client, the dispatcher, the processing step and
//! the metrics aggregator. Business crates depend on this crate only.
//!
//! ## Ordering Model
//! - Entry ids are ordered within one queue, never across queues
//! - Acknowledging an entry deletes it; unacknowledged entries are
//!   delivered again (at-least-once)

mod entry;
mod error;
mod processor;
mod queue_config;
mod queue_key;
mod snapshot;
mod store;

pub use entry::*;
pub use error::*;
pub use processor::*;
pub use queue_config::*;
pub use queue_key::{ProcessingMode, QueueKey, HISTORICAL_SUFFIX};
pub use snapshot::*;
pub use store::*;
