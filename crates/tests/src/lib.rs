//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 队列发现 -> stream handler -> 确认删除
//! - Worker 快照 -> 聚合后的 exposition

#[cfg(test)]
mod contract_tests {
    use contracts::{ProcessingMode, QueueKey};

    #[test]
    fn test_queue_classification() {
        let historical = QueueKey::from("acct.near/myfn:historical:stream");
        let real_time = QueueKey::from("acct.near/myfn:real-time:stream");

        assert_eq!(historical.mode(), ProcessingMode::Historical);
        assert_eq!(real_time.mode(), ProcessingMode::RealTime);
        assert_eq!(historical.storage_key(), "acct.near/myfn:historical:stream:storage");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        EntryId, MessageProcessor, ProcessError, ProcessingContext, QueueConfig, QueueKey,
    };
    use dispatcher::{Dispatcher, DispatcherConfig, HandlerConfig, HandlerStatus};
    use log_store::InMemoryLogStore;
    use tokio::time::{sleep, timeout};

    /// Captures what the processing step was handed
    #[derive(Default)]
    struct CapturingProcessor {
        seen: Mutex<Vec<(String, String, u64, Option<String>)>>,
    }

    impl MessageProcessor for CapturingProcessor {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn process(&self, ctx: ProcessingContext<'_>) -> Result<(), ProcessError> {
            self.seen.lock().unwrap().push((
                ctx.queue.to_string(),
                ctx.config.full_name(),
                ctx.entry.block_height,
                ctx.cached.map(|c| c.payload.clone()),
            ));
            Ok(())
        }
    }

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

    fn config_for(account_id: &str, function_name: &str) -> QueueConfig {
        QueueConfig {
            account_id: account_id.into(),
            function_name: function_name.into(),
            code: "console.log(block.height)".into(),
            schema: "CREATE TABLE t (id int);".into(),
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// End-to-end: queue discovered -> handler spawned -> entry processed and deleted
    #[tokio::test]
    async fn test_e2e_discover_and_consume() {
        let store = InMemoryLogStore::new();
        let queue = QueueKey::from("acct.near/myfn:real-time:stream");
        store.add_queue(queue.clone());
        store.set_config(&queue, &config_for("acct.near", "myfn"));
        store.append_with_id(queue.clone(), EntryId::new(1, 0), 100);
        store.cache_item(100, "{\"block\":{\"height\":100}}");

        let processor = Arc::new(CapturingProcessor::default());
        let dispatcher = Dispatcher::new(store.clone(), processor.clone(), fast_config());
        let registry = dispatcher.registry().clone();
        let dispatcher_handle = dispatcher.spawn();

        eventually(|| store.pending(&queue) == 0).await;
        eventually(|| processor.seen.lock().unwrap().len() == 1).await;

        let seen = processor.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(
                queue.to_string(),
                "acct.near/myfn".to_string(),
                100,
                Some("{\"block\":{\"height\":100}}".to_string()),
            )]
        );
        assert_eq!(registry.len(), 1);

        // Shutdown: dropping the dispatcher releases the store and the
        // handler notices on its next store call
        dispatcher_handle.abort();
        let _ = dispatcher_handle.await;
        assert!(store.is_released());
        eventually(|| registry.snapshots()[0].1.status == HandlerStatus::Stopped).await;
    }

    /// Queues appearing later are picked up; historical and real-time both
    /// drain in id order
    #[tokio::test]
    async fn test_e2e_late_queues_and_ordering() {
        let store = InMemoryLogStore::new();
        let historical = QueueKey::from("acct.near/myfn:historical:stream");
        let real_time = QueueKey::from("other.near/fn:real-time:stream");
        for queue in [&historical, &real_time] {
            store.set_config(queue, &config_for("acct.near", "myfn"));
        }
        store.add_queue(historical.clone());
        for height in [10, 11, 12] {
            store.append(historical.clone(), height);
        }

        let processor = Arc::new(CapturingProcessor::default());
        let dispatcher = Dispatcher::new(store.clone(), processor.clone(), fast_config());
        let registry = dispatcher.registry().clone();
        let dispatcher_handle = dispatcher.spawn();

        eventually(|| store.pending(&historical) == 0).await;

        store.add_queue(real_time.clone());
        store.append(real_time.clone(), 500);
        eventually(|| store.pending(&real_time) == 0).await;
        eventually(|| processor.seen.lock().unwrap().len() == 4).await;

        let heights: Vec<u64> = processor
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, ..)| *q == historical.as_str())
            .map(|(_, _, h, _)| *h)
            .collect();
        assert_eq!(heights, vec![10, 11, 12]);
        assert_eq!(registry.queues(), vec![historical, real_time]);

        dispatcher_handle.abort();
    }
}

#[cfg(test)]
mod metrics_tests {
    use contracts::{QueueKey, SnapshotStore};
    use log_store::InMemoryLogStore;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use observability::metrics::DURATION_BUCKETS_MS;
    use observability::{Exposition, MetricsAggregator};

    /// Render what one worker would publish after handling `hits` cache hits
    fn worker_exposition(queue: &QueueKey, hits: u64, execution_ms: f64) -> String {
        let recorder = PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS_MS)
            .unwrap()
            .build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            for _ in 0..hits {
                observability::record_cache_lookup(queue, queue.mode(), true);
            }
            observability::record_execution_duration_ms(queue, queue.mode(), execution_ms);
            observability::record_handler_count(1);
        });
        handle.render()
    }

    /// Two workers -> one merged view
    #[tokio::test]
    async fn test_fleet_metrics_are_merged() {
        let queue = QueueKey::from("acct.near/myfn:real-time:stream");
        let store = InMemoryLogStore::new();
        store
            .register_snapshot("worker-1", worker_exposition(&queue, 2, 3.0))
            .await
            .unwrap();
        store
            .register_snapshot("worker-2", worker_exposition(&queue, 5, 40.0))
            .await
            .unwrap();

        let body = MetricsAggregator::new(store).aggregate().await.unwrap();
        let merged = Exposition::parse(&body).unwrap();
        let labels = [
            ("queue", "acct.near/myfn:real-time:stream"),
            ("type", "real-time"),
        ];

        assert_eq!(
            merged.value("stream_runner_cache_hit_total", &labels),
            Some(7.0)
        );
        assert_eq!(
            merged.value("stream_runner_execution_duration_milliseconds_count", &labels),
            Some(2.0)
        );
        assert_eq!(
            merged.value("stream_runner_execution_duration_milliseconds_sum", &labels),
            Some(43.0)
        );
        assert_eq!(merged.value("stream_runner_handlers", &[]), Some(2.0));
    }

    #[tokio::test]
    async fn test_no_workers_yields_empty_view() {
        let body = MetricsAggregator::new(InMemoryLogStore::new())
            .aggregate()
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
