//! StreamHandle - one consuming task per queue
//!
//! The task waits until the queue configuration can be loaded, then loops:
//! scan backlog -> read batch -> process -> acknowledge. Failures stay
//! inside the task and surface through logs, metrics and [`HandlerStats`].

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use contracts::{
    EntryId, LogEntry, LogStore, MessageProcessor, ProcessingContext, ProcessingMode, QueueConfig,
    QueueKey, StoreError,
};
use observability::metrics as instruments;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::stats::{HandlerStats, HandlerStatus};

/// Stream handler tuning
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Entries read per batch
    pub batch_size: usize,
    /// Sleep when the queue is empty
    pub idle_interval: Duration,
    /// Sleep after a processing or store failure before reading again
    pub failure_backoff: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            idle_interval: Duration::from_millis(100),
            failure_backoff: Duration::from_secs(10),
        }
    }
}

/// Handle to a running stream handler
pub struct StreamHandle {
    queue: QueueKey,
    mode: ProcessingMode,
    stats: Arc<HandlerStats>,
    worker_handle: JoinHandle<()>,
}

impl StreamHandle {
    /// Spawn the handler task for `queue`
    pub fn spawn<S, P>(queue: QueueKey, store: S, processor: Arc<P>, config: HandlerConfig) -> Self
    where
        S: LogStore + Sync + 'static,
        P: MessageProcessor + Sync + 'static,
    {
        let mode = queue.mode();
        let stats = Arc::new(HandlerStats::new());

        let worker = StreamWorker {
            queue: queue.clone(),
            mode,
            store,
            processor,
            config,
            stats: Arc::clone(&stats),
        };
        let worker_handle = tokio::spawn(worker.run());

        Self {
            queue,
            mode,
            stats,
            worker_handle,
        }
    }

    pub fn queue(&self) -> &QueueKey {
        &self.queue
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Get current stats
    pub fn stats(&self) -> &Arc<HandlerStats> {
        &self.stats
    }

    /// Whether the handler task has ended (store released)
    pub fn is_finished(&self) -> bool {
        self.worker_handle.is_finished()
    }
}

enum Step {
    /// At least one entry was acknowledged
    Progress,
    /// Nothing to read
    Idle,
    /// The processing step failed; the entry stays unacknowledged
    ProcessingFailed,
}

struct StreamWorker<S, P> {
    queue: QueueKey,
    mode: ProcessingMode,
    store: S,
    processor: Arc<P>,
    config: HandlerConfig,
    stats: Arc<HandlerStats>,
}

impl<S, P> StreamWorker<S, P>
where
    S: LogStore + Sync,
    P: MessageProcessor + Sync,
{
    #[instrument(
        name = "stream_handler_loop",
        skip(self),
        fields(queue = %self.queue, mode = %self.mode)
    )]
    async fn run(self) {
        debug!("Stream handler started");

        let Some(queue_config) = self.load_config().await else {
            return;
        };

        self.stats.set_status(HandlerStatus::Running);
        info!(
            function = %queue_config.full_name(),
            processor = self.processor.name(),
            "Stream handler running"
        );

        let mut cursor = EntryId::SMALLEST;
        loop {
            match self.step(&queue_config, &mut cursor).await {
                Ok(Step::Progress) => {}
                Ok(Step::Idle) => tokio::time::sleep(self.config.idle_interval).await,
                Ok(Step::ProcessingFailed) => {
                    tokio::time::sleep(self.config.failure_backoff).await
                }
                Err(StoreError::Closed) => {
                    self.stats.set_status(HandlerStatus::Stopped);
                    info!("Store released, stream handler stopped");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Store operation failed, backing off");
                    tokio::time::sleep(self.config.failure_backoff).await;
                }
            }
        }
    }

    /// Fetch the queue configuration, retrying every `failure_backoff`.
    ///
    /// No entry is processed while the configuration is missing. Returns
    /// `None` once the store is released.
    async fn load_config(&self) -> Option<QueueConfig> {
        loop {
            match self.store.get_config(&self.queue).await {
                Ok(config) => return Some(config),
                Err(StoreError::Closed) => {
                    self.stats.set_status(HandlerStatus::Stopped);
                    info!("Store released before configuration was loaded");
                    return None;
                }
                Err(e) if e.is_not_found() => {
                    // Queue registered before its configuration was written
                    warn!(error = %e, "Queue configuration missing, retrying");
                }
                Err(e) => {
                    error!(error = %e, "Failed to load queue configuration, retrying");
                }
            }
            self.stats.set_status(HandlerStatus::Failed);
            tokio::time::sleep(self.config.failure_backoff).await;
        }
    }

    async fn step(
        &self,
        queue_config: &QueueConfig,
        cursor: &mut EntryId,
    ) -> Result<Step, StoreError> {
        let backlog = self
            .store
            .scan_unprocessed(&self.queue, EntryId::SMALLEST)
            .await?
            .len();
        self.stats.set_backlog(backlog);
        instruments::record_unprocessed_entries(&self.queue, self.mode, backlog);

        let batch = self
            .store
            .read_from(&self.queue, *cursor, self.config.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(Step::Idle);
        }

        for entry in &batch {
            if !self.process_entry(queue_config, entry).await? {
                return Ok(Step::ProcessingFailed);
            }
            *cursor = entry.id;
        }
        Ok(Step::Progress)
    }

    /// Process and acknowledge one entry. Returns `false` if the processing
    /// step failed and the entry was left in the queue.
    async fn process_entry(
        &self,
        queue_config: &QueueConfig,
        entry: &LogEntry,
    ) -> Result<bool, StoreError> {
        instruments::record_entry_wait_ms(
            &self.queue,
            self.mode,
            entry.id.age_ms(unix_millis()) as f64,
        );

        let cached = match self.store.get_cached_item(entry.block_height).await {
            Ok(item) => item,
            Err(StoreError::Closed) => return Err(StoreError::Closed),
            Err(e) => {
                warn!(block_height = entry.block_height, error = %e, "Cache lookup failed");
                None
            }
        };
        instruments::record_cache_lookup(&self.queue, self.mode, cached.is_some());

        let ctx = ProcessingContext {
            queue: &self.queue,
            config: queue_config,
            entry,
            cached: cached.as_ref(),
        };
        let started = Instant::now();
        let outcome = self.processor.process(ctx).await;
        instruments::record_execution_duration_ms(
            &self.queue,
            self.mode,
            started.elapsed().as_secs_f64() * 1000.0,
        );

        if let Err(e) = outcome {
            self.stats.inc_failure_count();
            instruments::record_processing_failure(&self.queue, self.mode);
            error!(
                id = %entry.id,
                block_height = entry.block_height,
                error = %e,
                "Processing failed, entry left unacknowledged"
            );
            return Ok(false);
        }

        self.store.acknowledge(&self.queue, entry.id).await?;
        self.stats.record_processed(entry.block_height);
        instruments::record_last_processed_block_height(&self.queue, self.mode, entry.block_height);
        debug!(id = %entry.id, block_height = entry.block_height, "Entry acknowledged");

        Ok(true)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
