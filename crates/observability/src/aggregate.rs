//! Cross-process metrics aggregation
//!
//! Every worker registers its rendered metrics under its own id; the
//! aggregator merges whatever is registered each time it is asked. Entries
//! are never expired, so a worker that stopped reporting keeps
//! contributing its last snapshot until its id is reused.

use std::sync::Arc;
use std::time::Duration;

use contracts::{SnapshotStore, StoreError, WorkerSnapshot};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::exposition::Exposition;

/// In-process snapshot registry
///
/// Last write wins; concurrent registrations only contend on the map shard.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<DashMap<String, String>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    async fn register_snapshot(&self, worker_id: &str, payload: String) -> Result<(), StoreError> {
        self.snapshots.insert(worker_id.to_string(), payload);
        Ok(())
    }

    async fn snapshots(&self) -> Result<Vec<WorkerSnapshot>, StoreError> {
        Ok(self
            .snapshots
            .iter()
            .map(|entry| WorkerSnapshot {
                worker_id: entry.key().clone(),
                payload: entry.value().clone(),
            })
            .collect())
    }
}

/// Merges all registered worker snapshots into one exposition
#[derive(Debug, Clone)]
pub struct MetricsAggregator<S> {
    store: S,
}

impl<S> MetricsAggregator<S>
where
    S: SnapshotStore + Sync,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Merge the current snapshots. Zero workers yields an empty exposition.
    ///
    /// A snapshot that fails to parse is skipped so one bad worker cannot
    /// take down the whole endpoint.
    #[instrument(name = "metrics_aggregate", skip(self))]
    pub async fn aggregate(&self) -> Result<String, StoreError> {
        let snapshots = self.store.snapshots().await?;
        let mut merged = Exposition::default();

        for snapshot in &snapshots {
            match Exposition::parse(&snapshot.payload) {
                Ok(parsed) => merged.merge(parsed),
                Err(e) => warn!(
                    worker_id = %snapshot.worker_id,
                    error = %e,
                    "Skipping malformed worker snapshot"
                ),
            }
        }

        debug!(workers = snapshots.len(), "Aggregated worker snapshots");
        Ok(merged.render())
    }
}

/// Periodically publishes this process's metrics as a worker snapshot
pub struct WorkerReporter<S> {
    worker_id: String,
    handle: PrometheusHandle,
    store: S,
    interval: Duration,
}

impl<S> WorkerReporter<S>
where
    S: SnapshotStore + Sync + 'static,
{
    pub fn new(
        worker_id: impl Into<String>,
        handle: PrometheusHandle,
        store: S,
        interval: Duration,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            handle,
            store,
            interval,
        }
    }

    /// Render local metrics and register them under this worker's id
    pub async fn report_once(&self) -> Result<(), StoreError> {
        self.handle.run_upkeep();
        let payload = self.handle.render();
        self.store
            .register_snapshot(&self.worker_id, payload)
            .await
    }

    /// Spawn the reporting loop. Failed reports are logged and retried on
    /// the next tick.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.report_once().await {
                    warn!(worker_id = %self.worker_id, error = %e, "Failed to report worker metrics");
                }
            }
        })
    }
}
