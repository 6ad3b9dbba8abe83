//! MessageProcessor trait - the per-entry processing step
//!
//! The real implementation (indexer function execution) lives outside this
//! workspace; handlers only drive it and record its outcome.

use crate::{CachedItem, LogEntry, ProcessError, QueueConfig, QueueKey};

/// Everything a processor gets for one entry
#[derive(Debug, Clone, Copy)]
pub struct ProcessingContext<'a> {
    pub queue: &'a QueueKey,
    pub config: &'a QueueConfig,
    pub entry: &'a LogEntry,
    /// Cached block payload, `None` on a cache miss
    pub cached: Option<&'a CachedItem>,
}

/// Processing step invoked once per delivered entry.
///
/// Delivery is at-least-once: an entry whose acknowledgment did not land is
/// delivered again, so implementations must tolerate reprocessing.
#[trait_variant::make(MessageProcessor: Send)]
pub trait LocalMessageProcessor {
    /// Processor name (used for logging)
    fn name(&self) -> &str;

    /// Process a single entry.
    async fn process(&self, ctx: ProcessingContext<'_>) -> Result<(), ProcessError>;
}
