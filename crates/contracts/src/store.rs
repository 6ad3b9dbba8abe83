//! LogStore trait - typed operations against the ordered-log key space
//!
//! Key layout:
//!
//! | key | shape |
//! |---|---|
//! | `streams` | set of queue keys |
//! | `<queueKey>` | ordered log of `{block_height}` entries |
//! | `<queueKey>:storage` | JSON [`QueueConfig`] |
//! | `streamer:message:<height>` | cached block payload |

use crate::{CachedItem, EntryId, LogEntry, QueueConfig, QueueKey, StoreError};

/// Set holding every known queue key.
pub const STREAMS_SET_KEY: &str = "streams";

/// Prefix of shared cached block payloads.
pub const STREAMER_MESSAGE_KEY_PREFIX: &str = "streamer:message:";

/// Cache key for a block height.
pub fn cached_item_key(block_height: u64) -> String {
    format!("{STREAMER_MESSAGE_KEY_PREFIX}{block_height}")
}

/// Ordered-log store client
///
/// Implementations are shared by the dispatcher and every handler, so they
/// must be cheap to clone and safe for concurrent use.
#[trait_variant::make(LogStore: Send)]
pub trait LocalLogStore {
    /// Current members of the queue registry. Unordered.
    async fn list_queues(&self) -> Result<Vec<QueueKey>, StoreError>;

    /// Up to `count` entries with id `>= from`, in increasing id order.
    ///
    /// Returns an empty vector when nothing qualifies.
    async fn read_from(
        &self,
        queue: &QueueKey,
        from: EntryId,
        count: usize,
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// Every entry from `from` to the end of the queue.
    async fn scan_unprocessed(
        &self,
        queue: &QueueKey,
        from: EntryId,
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// Remove an entry, marking it processed. Deleting a missing id is a no-op.
    async fn acknowledge(&self, queue: &QueueKey, id: EntryId) -> Result<(), StoreError>;

    /// Configuration of the queue's processing step.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if nothing is stored for the queue.
    async fn get_config(&self, queue: &QueueKey) -> Result<QueueConfig, StoreError>;

    /// Shared cached block payload; `None` on a cache miss.
    async fn get_cached_item(&self, block_height: u64) -> Result<Option<CachedItem>, StoreError>;

    /// Drop the underlying connection. Later calls fail with
    /// [`StoreError::Closed`].
    fn release(&self);
}
