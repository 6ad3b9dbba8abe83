//! `queues` command implementation.

use anyhow::{Context, Result};
use contracts::{EntryId, LogStore};
use serde::Serialize;

use super::{connect, ReleaseOnDrop};
use crate::cli::QueuesArgs;

/// Queue info for JSON output
#[derive(Serialize, Debug, PartialEq)]
struct QueueInfo {
    queue: String,
    mode: String,
    backlog: usize,
}

/// Execute the `queues` command
pub async fn run_queues(args: &QueuesArgs) -> Result<()> {
    let store = connect(&args.redis_connection_string).await?;
    let infos = collect_queue_infos(store).await?;

    if args.json {
        let json = serde_json::to_string_pretty(&infos).context("Failed to serialize queues")?;
        println!("{}", json);
    } else {
        print_queues(&infos);
    }

    Ok(())
}

/// Sorted queues with their backlog. The store is released on return.
async fn collect_queue_infos<S: LogStore + Sync>(store: S) -> Result<Vec<QueueInfo>> {
    let store = ReleaseOnDrop(store);

    let mut queues = store
        .list_queues()
        .await
        .context("Failed to list queues")?;
    queues.sort();

    let mut infos = Vec::with_capacity(queues.len());
    for queue in &queues {
        let backlog = store
            .scan_unprocessed(queue, EntryId::SMALLEST)
            .await
            .with_context(|| format!("Failed to scan {queue}"))?
            .len();
        infos.push(QueueInfo {
            queue: queue.to_string(),
            mode: queue.mode().to_string(),
            backlog,
        });
    }
    Ok(infos)
}

fn print_queues(infos: &[QueueInfo]) {
    println!("\n=== Queues ({}) ===\n", infos.len());
    for info in infos {
        println!("  {:<60} {:<10} {:>8}", info.queue, info.mode, info.backlog);
    }
}
