//! Dispatcher - discovery loop keeping one stream handler per queue

use std::sync::Arc;
use std::time::Duration;

use contracts::{LogStore, MessageProcessor, StoreError};
use observability::metrics as instruments;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::DispatcherError;
use crate::handler::{HandlerConfig, StreamHandle};
use crate::registry::HandlerRegistry;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pause between discovery ticks
    pub poll_interval: Duration,
    /// Settings handed to every spawned handler
    pub handler: HandlerConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            handler: HandlerConfig::default(),
        }
    }
}

/// Releases the store connection when dropped, whichever way `run` ends.
struct ReleaseGuard<S: LogStore> {
    store: S,
}

impl<S: LogStore> Drop for ReleaseGuard<S> {
    fn drop(&mut self) {
        self.store.release();
        info!("Store connection released");
    }
}

/// Discovers queues and spawns a handler for each new one
pub struct Dispatcher<S, P> {
    store: S,
    processor: Arc<P>,
    config: DispatcherConfig,
    registry: HandlerRegistry,
}

impl<S, P> Dispatcher<S, P>
where
    S: LogStore + Clone + Sync + 'static,
    P: MessageProcessor + Sync + 'static,
{
    pub fn new(store: S, processor: Arc<P>, config: DispatcherConfig) -> Self {
        Self {
            store,
            processor,
            config,
            registry: HandlerRegistry::new(),
        }
    }

    /// Shared view of the registered handlers
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// One discovery pass. Returns how many handlers were started.
    #[instrument(name = "dispatcher_tick", skip(self))]
    pub async fn tick(&self) -> Result<usize, StoreError> {
        let queues = self.store.list_queues().await?;

        let mut started = 0;
        for queue in &queues {
            let spawned = self.registry.register_with(queue, || {
                StreamHandle::spawn(
                    queue.clone(),
                    self.store.clone(),
                    Arc::clone(&self.processor),
                    self.config.handler.clone(),
                )
            });
            if spawned {
                started += 1;
                instruments::record_handler_count(self.registry.len());
                info!(queue = %queue, mode = %queue.mode(), "Stream handler registered");
            }
        }

        debug!(
            discovered = queues.len(),
            started,
            handlers = self.registry.len(),
            "Discovery tick complete"
        );
        Ok(started)
    }

    /// Run discovery until a non-transient store error.
    ///
    /// The store connection is released when this returns or when the
    /// future is dropped. Handlers keep running; they stop on their own
    /// once they observe the released store.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(self) -> Result<(), DispatcherError> {
        let _guard = ReleaseGuard {
            store: self.store.clone(),
        };
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Dispatcher started"
        );

        loop {
            match self.tick().await {
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Queue discovery failed, retrying next tick");
                }
                Err(e) => {
                    warn!(error = %e, "Queue discovery failed, dispatcher exiting");
                    return Err(e.into());
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<Result<(), DispatcherError>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::LogProcessor;
    use crate::stats::HandlerStatus;
    use contracts::{EntryId, QueueConfig, QueueKey};
    use log_store::InMemoryLogStore;
    use std::collections::HashSet;
    use tokio::time::{sleep, timeout};

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: Duration::from_millis(5),
            handler: HandlerConfig {
                batch_size: 1,
                idle_interval: Duration::from_millis(5),
                failure_backoff: Duration::from_millis(5),
            },
        }
    }

    fn dispatcher(store: &InMemoryLogStore) -> Dispatcher<InMemoryLogStore, LogProcessor> {
        Dispatcher::new(store.clone(), Arc::new(LogProcessor::new("test")), fast_config())
    }

    fn registered(d: &Dispatcher<InMemoryLogStore, LogProcessor>) -> HashSet<QueueKey> {
        d.registry().queues().into_iter().collect()
    }

    #[tokio::test]
    async fn test_tick_registers_each_queue_once() {
        let store = InMemoryLogStore::new();
        store.add_queue("a:real-time:stream");
        store.add_queue("b:historical:stream");
        let d = dispatcher(&store);

        assert_eq!(d.tick().await.unwrap(), 2);
        assert_eq!(d.tick().await.unwrap(), 0);
        assert_eq!(d.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_registry_only_grows() {
        let store = InMemoryLogStore::new();
        let d = dispatcher(&store);

        store.add_queue("q1");
        d.tick().await.unwrap();
        let first = registered(&d);

        store.add_queue("q2");
        d.tick().await.unwrap();
        let second = registered(&d);

        store.remove_queue("q1");
        d.tick().await.unwrap();
        let third = registered(&d);

        assert!(first.is_subset(&second));
        assert!(second.is_subset(&third));
        assert!(third.contains("q1"));
        assert_eq!(third.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_ticks_never_duplicate_handlers() {
        let store = InMemoryLogStore::new();
        for i in 0..20 {
            store.add_queue(format!("q{i}"));
        }
        let d = Arc::new(dispatcher(&store));

        let ticks: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&d);
                tokio::spawn(async move { d.tick().await.unwrap() })
            })
            .collect();
        let mut started = 0;
        for tick in ticks {
            started += tick.await.unwrap();
        }

        assert_eq!(started, 20);
        assert_eq!(d.registry().len(), 20);
    }

    #[tokio::test]
    async fn test_run_releases_store_on_fatal_error() {
        let store = InMemoryLogStore::new();
        store.add_queue("q");
        let d = dispatcher(&store);
        store.release();

        let result = d.run().await;

        assert!(matches!(
            result,
            Err(DispatcherError::Discovery(StoreError::Closed))
        ));
        assert!(store.is_released());
    }

    #[tokio::test]
    async fn test_run_releases_store_when_aborted() {
        let store = InMemoryLogStore::new();
        let handle = dispatcher(&store).spawn();

        timeout(Duration::from_secs(5), async {
            while store.list_calls() < 3 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!store.is_released());

        handle.abort();
        let _ = handle.await;
        assert!(store.is_released());
    }

    #[tokio::test]
    async fn test_run_survives_transient_errors() {
        let store = InMemoryLogStore::new();
        store.inject_connection_failures(3);
        let d = dispatcher(&store);
        let registry = d.registry().clone();
        let handle = d.spawn();

        store.add_queue("late");
        timeout(Duration::from_secs(5), async {
            while !registry.contains("late") {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_spawned_handlers_consume_entries() {
        let store = InMemoryLogStore::new();
        let queue: QueueKey = "acct.near/myfn:real-time:stream".into();
        store.add_queue(queue.clone());
        store.set_config(
            &queue,
            &QueueConfig {
                account_id: "acct.near".into(),
                function_name: "myfn".into(),
                code: "".into(),
                schema: "".into(),
            },
        );
        store.append_with_id(queue.clone(), EntryId::new(1, 0), 100);
        store.add_queue("missing-config");

        let d = dispatcher(&store);
        d.tick().await.unwrap();

        let settled = || {
            let snapshots = d.registry().snapshots();
            snapshots[0].1.processed_count == 1 && snapshots[1].1.status == HandlerStatus::Failed
        };
        timeout(Duration::from_secs(5), async {
            while !settled() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // The handler without configuration waits, still registered
        let snapshots = d.registry().snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].0, queue);
        assert_eq!(snapshots[0].1.last_block_height, 100);
        assert_eq!(store.pending(&queue), 0);
        assert!(d.registry().contains("missing-config"));
    }
}
