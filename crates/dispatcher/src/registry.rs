//! Queue -> handler registry
//!
//! Grow-only: a queue that disappears from the discovery set keeps its
//! handler (and task) for the life of the process.

use std::sync::Arc;

use contracts::QueueKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::handler::StreamHandle;
use crate::stats::HandlerSnapshot;

/// Concurrent map of running stream handlers, cheap to clone
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<QueueKey, StreamHandle>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handler for `queue` unless one exists. `spawn` runs at most
    /// once per key, under the shard lock, so concurrent callers never start
    /// two handlers for the same queue.
    ///
    /// Returns `true` if a new handler was started.
    pub fn register_with<F>(&self, queue: &QueueKey, spawn: F) -> bool
    where
        F: FnOnce() -> StreamHandle,
    {
        match self.handlers.entry(queue.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(spawn());
                true
            }
        }
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.handlers.contains_key(queue)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered queue keys, sorted
    pub fn queues(&self) -> Vec<QueueKey> {
        let mut queues: Vec<QueueKey> = self.handlers.iter().map(|h| h.key().clone()).collect();
        queues.sort();
        queues
    }

    /// Stats of every handler, sorted by queue
    pub fn snapshots(&self) -> Vec<(QueueKey, HandlerSnapshot)> {
        let mut snapshots: Vec<_> = self
            .handlers
            .iter()
            .map(|h| (h.key().clone(), h.value().stats().snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }
}
