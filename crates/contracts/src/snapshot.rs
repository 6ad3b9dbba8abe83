//! Worker metric snapshots
//!
//! Each worker process publishes its rendered metrics under its own id;
//! the exposition endpoint merges whatever is registered at request time.

use crate::StoreError;

/// Serialized metrics of one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    /// Prometheus text exposition
    pub payload: String,
}

/// Last-write-wins registry of worker snapshots. Entries never expire.
#[trait_variant::make(SnapshotStore: Send)]
pub trait LocalSnapshotStore {
    /// Insert or overwrite the snapshot of `worker_id`.
    async fn register_snapshot(&self, worker_id: &str, payload: String) -> Result<(), StoreError>;

    /// Every registered snapshot, in no particular order.
    async fn snapshots(&self) -> Result<Vec<WorkerSnapshot>, StoreError>;
}
