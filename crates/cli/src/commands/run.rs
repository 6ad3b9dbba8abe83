//! `run` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::SnapshotStore;
use dispatcher::{Dispatcher, LogProcessor};
use observability::{InMemorySnapshotStore, MetricsAggregator, PrometheusHandle, WorkerReporter};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{connect, ReleaseOnDrop};
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_worker(args: &RunArgs) -> Result<()> {
    args.validate()?;

    let worker_id = args.worker_id();
    let handle = observability::install_recorder()?;

    let store = connect(&args.redis_connection_string).await?;

    // Separate connection: the dispatcher releases its own on shutdown
    let (snapshot_connection, (reporter, server)) = if args.shared_metrics {
        let snapshots = connect(&args.redis_connection_string).await?;
        (
            Some(ReleaseOnDrop(snapshots.clone())),
            start_metrics(snapshots, handle, &worker_id, args),
        )
    } else {
        (
            None,
            start_metrics(InMemorySnapshotStore::new(), handle, &worker_id, args),
        )
    };

    let dispatcher = Dispatcher::new(
        store,
        Arc::new(LogProcessor::new("log")),
        args.dispatcher_config(),
    );

    let shutdown_signal = setup_shutdown_signal();

    info!(
        worker_id = %worker_id,
        port = args.port,
        shared_metrics = args.shared_metrics,
        "Starting stream runner..."
    );

    let outcome = tokio::select! {
        result = dispatcher.run() => {
            result.context("Dispatcher stopped")
        }
        result = server => {
            match result {
                Ok(served) => served,
                Err(e) => Err(e).context("Metrics server task panicked"),
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping stream runner...");
            Ok(())
        }
    };

    reporter.abort();
    drop(snapshot_connection);
    info!("Stream runner finished");
    outcome
}

/// Spawn the snapshot reporter and the `/metrics` server over one store
fn start_metrics<S>(
    store: S,
    handle: PrometheusHandle,
    worker_id: &str,
    args: &RunArgs,
) -> (JoinHandle<()>, JoinHandle<Result<()>>)
where
    S: SnapshotStore + Clone + Sync + 'static,
{
    let reporter =
        WorkerReporter::new(worker_id, handle, store.clone(), args.report_interval()).spawn();
    let server = tokio::spawn(observability::serve(
        args.port,
        MetricsAggregator::new(store),
    ));
    (reporter, server)
}

/// Wait for Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
