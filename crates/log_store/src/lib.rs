//! # Log Store
//!
//! Ordered-log store clients.
//!
//! Responsibilities:
//! - Discover queues from the well-known registry set
//! - Read, range-scan and acknowledge queue entries
//! - Look up queue configuration and shared cached blocks
//! - Hold worker metric snapshots when metrics are shared across processes
//!
//! Two implementations of [`contracts::LogStore`]:
//!
//! - [`RedisLogStore`]: Redis streams over an auto-reconnecting connection
//! - [`InMemoryLogStore`]: in-process store for tests and local runs, with
//!   connection failure injection

pub mod memory_store;
pub mod redis_store;

pub use contracts::{LogStore, SnapshotStore, StoreError};
pub use memory_store::InMemoryLogStore;
pub use redis_store::{RedisLogStore, WORKER_METRICS_KEY};
