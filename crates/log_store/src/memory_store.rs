//! In-memory store
//!
//! Mirrors the Redis key layout in process memory. Used by unit and
//! end-to-end tests, supports injecting connection failures.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use contracts::{
    CachedItem, EntryId, LogEntry, LogStore, QueueConfig, QueueKey, SnapshotStore, StoreError,
    WorkerSnapshot,
};
use tracing::instrument;

#[derive(Default)]
struct State {
    /// Queue registry set
    queues: BTreeSet<QueueKey>,
    /// Queue -> (entry id -> block height)
    streams: HashMap<QueueKey, BTreeMap<EntryId, u64>>,
    /// Storage key -> raw JSON
    configs: HashMap<String, String>,
    /// Block height -> cached payload
    cache: HashMap<u64, String>,
    /// Worker id -> exposition
    snapshots: HashMap<String, String>,
    /// Last auto-generated id, keeps generated ids strictly increasing
    last_id: EntryId,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    released: AtomicBool,
    /// Remaining calls that fail with a connection error
    injected_failures: AtomicU32,
    list_calls: AtomicU64,
}

/// In-memory store
///
/// Clones share state, like clones of a real client share a connection.
#[derive(Clone, Default)]
pub struct InMemoryLogStore {
    inner: Arc<Inner>,
}

impl InMemoryLogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a key to the queue registry
    pub fn add_queue(&self, queue: impl Into<QueueKey>) {
        self.state().queues.insert(queue.into());
    }

    /// Remove a key from the queue registry (its entries stay)
    pub fn remove_queue(&self, queue: &str) {
        self.state().queues.remove(queue);
    }

    /// Append an entry with an auto-generated id, like `XADD <queue> *`
    pub fn append(&self, queue: impl Into<QueueKey>, block_height: u64) -> EntryId {
        let mut state = self.state();
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let id = if now_ms > state.last_id.millis {
            EntryId::new(now_ms, 0)
        } else {
            EntryId::new(state.last_id.millis, state.last_id.seq + 1)
        };
        state.last_id = id;
        state
            .streams
            .entry(queue.into())
            .or_default()
            .insert(id, block_height);
        id
    }

    /// Append an entry with an explicit id
    pub fn append_with_id(&self, queue: impl Into<QueueKey>, id: EntryId, block_height: u64) {
        let mut state = self.state();
        if id > state.last_id {
            state.last_id = id;
        }
        state
            .streams
            .entry(queue.into())
            .or_default()
            .insert(id, block_height);
    }

    /// Store the queue's configuration as JSON
    pub fn set_config(&self, queue: &QueueKey, config: &QueueConfig) {
        // Serializing a struct of plain strings cannot fail.
        let raw = serde_json::to_string(config).unwrap_or_default();
        self.set_raw_config(queue, raw);
    }

    /// Store a raw configuration value
    pub fn set_raw_config(&self, queue: &QueueKey, raw: impl Into<String>) {
        self.state().configs.insert(queue.storage_key(), raw.into());
    }

    /// Put a payload in the shared block cache
    pub fn cache_item(&self, block_height: u64, payload: impl Into<String>) {
        self.state().cache.insert(block_height, payload.into());
    }

    /// Make the next `count` operations fail with a connection error
    pub fn inject_connection_failures(&self, count: u32) {
        self.inner.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Number of entries still in the queue
    pub fn pending(&self, queue: &str) -> usize {
        self.state().streams.get(queue).map_or(0, BTreeMap::len)
    }

    /// How many times the registry was listed
    pub fn list_calls(&self) -> u64 {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Whether [`LogStore::release`] was called
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.is_released() {
            return Err(StoreError::Closed);
        }
        let consumed = self
            .inner
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(StoreError::connection("injected connection failure"));
        }
        Ok(())
    }

    fn range(&self, queue: &QueueKey, from: EntryId, limit: Option<usize>) -> Vec<LogEntry> {
        let state = self.state();
        let Some(stream) = state.streams.get(queue) else {
            return Vec::new();
        };
        stream
            .range(from..)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, height)| LogEntry::new(*id, *height))
            .collect()
    }
}

impl LogStore for InMemoryLogStore {
    #[instrument(name = "memory_store_list_queues", skip(self))]
    async fn list_queues(&self) -> Result<Vec<QueueKey>, StoreError> {
        self.inner.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.state().queues.iter().cloned().collect())
    }

    async fn read_from(
        &self,
        queue: &QueueKey,
        from: EntryId,
        count: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        self.check_available()?;
        Ok(self.range(queue, from, Some(count)))
    }

    async fn scan_unprocessed(
        &self,
        queue: &QueueKey,
        from: EntryId,
    ) -> Result<Vec<LogEntry>, StoreError> {
        self.check_available()?;
        Ok(self.range(queue, from, None))
    }

    async fn acknowledge(&self, queue: &QueueKey, id: EntryId) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(stream) = self.state().streams.get_mut(queue) {
            stream.remove(&id);
        }
        Ok(())
    }

    async fn get_config(&self, queue: &QueueKey) -> Result<QueueConfig, StoreError> {
        self.check_available()?;
        let key = queue.storage_key();
        let raw = self
            .state()
            .configs
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&key))?;
        QueueConfig::from_json(&key, &raw)
    }

    async fn get_cached_item(&self, block_height: u64) -> Result<Option<CachedItem>, StoreError> {
        self.check_available()?;
        Ok(self
            .state()
            .cache
            .get(&block_height)
            .map(|payload| CachedItem {
                block_height,
                payload: payload.clone(),
            }))
    }

    fn release(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }
}

impl SnapshotStore for InMemoryLogStore {
    async fn register_snapshot(&self, worker_id: &str, payload: String) -> Result<(), StoreError> {
        self.check_available()?;
        self.state()
            .snapshots
            .insert(worker_id.to_string(), payload);
        Ok(())
    }

    async fn snapshots(&self) -> Result<Vec<WorkerSnapshot>, StoreError> {
        self.check_available()?;
        Ok(self
            .state()
            .snapshots
            .iter()
            .map(|(worker_id, payload)| WorkerSnapshot {
                worker_id: worker_id.clone(),
                payload: payload.clone(),
            })
            .collect())
    }
}
