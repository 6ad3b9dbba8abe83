//! Redis-backed store client
//!
//! Queues are Redis streams; acknowledging deletes the stream entry.
//! Uses a `ConnectionManager`, which re-establishes dropped connections on
//! its own, so connection errors surface as transient [`StoreError`]s.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use contracts::{
    cached_item_key, CachedItem, EntryId, LogEntry, LogStore, QueueConfig, QueueKey,
    SnapshotStore, StoreError, WorkerSnapshot, STREAMS_SET_KEY,
};
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamRangeReply};
use redis::{AsyncCommands, Cmd, RedisError};
use tracing::{debug, info, instrument, warn};

/// End marker for range scans.
const LARGEST_STREAM_ID: &str = "+";

/// Hash holding shared worker metric snapshots (worker id -> exposition).
pub const WORKER_METRICS_KEY: &str = "metrics:workers";

/// Field carrying the block height of a stream entry.
const BLOCK_HEIGHT_FIELD: &str = "block_height";

/// Redis store client
///
/// Cloning shares the same connection manager. [`LogStore::release`] drops
/// the shared reference; clones then fail with [`StoreError::Closed`].
#[derive(Clone)]
pub struct RedisLogStore {
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisLogStore {
    /// Connect to the Redis instance at `connection_string`.
    #[instrument(name = "redis_store_connect", skip(connection_string))]
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| StoreError::connection(format!("invalid connection string: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| map_redis_error("connect", e))?;

        info!("Connected to Redis");

        Ok(Self {
            conn: Arc::new(RwLock::new(Some(manager))),
        })
    }

    /// Cheap clone of the shared connection manager.
    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.conn
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(StoreError::Closed)
    }
}

/// Split Redis failures into transient connection errors and the rest.
fn map_redis_error(operation: &str, err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        warn!(operation, error = %err, "Redis connection error");
        StoreError::connection(err.to_string())
    } else {
        StoreError::backend(format!("{operation}: {err}"))
    }
}

/// `XRANGE <queue> <from> + [COUNT n]`; both bounds are inclusive.
fn xrange_cmd(queue: &QueueKey, from: EntryId, count: Option<usize>) -> Cmd {
    let mut cmd = redis::cmd("XRANGE");
    cmd.arg(queue.as_str())
        .arg(from.to_string())
        .arg(LARGEST_STREAM_ID);
    if let Some(count) = count {
        cmd.arg("COUNT").arg(count);
    }
    cmd
}

/// `XDEL <queue> <id>`
fn xdel_cmd(queue: &QueueKey, id: EntryId) -> Cmd {
    let mut cmd = redis::cmd("XDEL");
    cmd.arg(queue.as_str()).arg(id.to_string());
    cmd
}

fn decode_entry(queue: &QueueKey, raw: &StreamId) -> Result<LogEntry, StoreError> {
    let id: EntryId = raw.id.parse()?;
    let block_height = raw.get::<u64>(BLOCK_HEIGHT_FIELD).ok_or_else(|| {
        StoreError::decode(
            queue.as_str(),
            format!("entry {} has no numeric {BLOCK_HEIGHT_FIELD}", raw.id),
        )
    })?;
    Ok(LogEntry { id, block_height })
}

fn decode_entries(queue: &QueueKey, reply: StreamRangeReply) -> Result<Vec<LogEntry>, StoreError> {
    reply
        .ids
        .iter()
        .map(|raw| decode_entry(queue, raw))
        .collect()
}

impl LogStore for RedisLogStore {
    #[instrument(name = "redis_store_list_queues", skip(self))]
    async fn list_queues(&self) -> Result<Vec<QueueKey>, StoreError> {
        let mut conn = self.connection()?;
        let keys: Vec<String> = conn
            .smembers(STREAMS_SET_KEY)
            .await
            .map_err(|e| map_redis_error("SMEMBERS", e))?;
        Ok(keys.into_iter().map(QueueKey::from).collect())
    }

    #[instrument(name = "redis_store_read_from", skip(self), fields(queue = %queue, from = %from))]
    async fn read_from(
        &self,
        queue: &QueueKey,
        from: EntryId,
        count: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let reply: StreamRangeReply = xrange_cmd(queue, from, Some(count))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XRANGE", e))?;
        decode_entries(queue, reply)
    }

    #[instrument(name = "redis_store_scan_unprocessed", skip(self), fields(queue = %queue, from = %from))]
    async fn scan_unprocessed(
        &self,
        queue: &QueueKey,
        from: EntryId,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let mut conn = self.connection()?;
        let reply: StreamRangeReply = xrange_cmd(queue, from, None)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XRANGE", e))?;
        decode_entries(queue, reply)
    }

    #[instrument(name = "redis_store_acknowledge", skip(self), fields(queue = %queue, id = %id))]
    async fn acknowledge(&self, queue: &QueueKey, id: EntryId) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let deleted: usize = xdel_cmd(queue, id)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XDEL", e))?;
        if deleted == 0 {
            debug!(queue = %queue, id = %id, "Entry already acknowledged");
        }
        Ok(())
    }

    #[instrument(name = "redis_store_get_config", skip(self), fields(queue = %queue))]
    async fn get_config(&self, queue: &QueueKey) -> Result<QueueConfig, StoreError> {
        let key = queue.storage_key();
        let mut conn = self.connection()?;
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| map_redis_error("GET", e))?;
        let raw = raw.ok_or_else(|| StoreError::not_found(&key))?;
        QueueConfig::from_json(&key, &raw)
    }

    #[instrument(name = "redis_store_get_cached_item", skip(self))]
    async fn get_cached_item(&self, block_height: u64) -> Result<Option<CachedItem>, StoreError> {
        let mut conn = self.connection()?;
        let payload: Option<String> = conn
            .get(cached_item_key(block_height))
            .await
            .map_err(|e| map_redis_error("GET", e))?;
        Ok(payload.map(|payload| CachedItem {
            block_height,
            payload,
        }))
    }

    fn release(&self) {
        let released = match self.conn.write() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if released {
            info!("Redis connection released");
        }
    }
}

impl SnapshotStore for RedisLogStore {
    #[instrument(name = "redis_store_register_snapshot", skip(self, payload), fields(bytes = payload.len()))]
    async fn register_snapshot(&self, worker_id: &str, payload: String) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: usize = conn
            .hset(WORKER_METRICS_KEY, worker_id, payload)
            .await
            .map_err(|e| map_redis_error("HSET", e))?;
        Ok(())
    }

    #[instrument(name = "redis_store_snapshots", skip(self))]
    async fn snapshots(&self) -> Result<Vec<WorkerSnapshot>, StoreError> {
        let mut conn = self.connection()?;
        let all: HashMap<String, String> = conn
            .hgetall(WORKER_METRICS_KEY)
            .await
            .map_err(|e| map_redis_error("HGETALL", e))?;
        Ok(all
            .into_iter()
            .map(|(worker_id, payload)| WorkerSnapshot { worker_id, payload })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::Value;

    fn stream_id(id: &str, height: Option<&str>) -> StreamId {
        let mut map = HashMap::new();
        if let Some(height) = height {
            map.insert(
                BLOCK_HEIGHT_FIELD.to_string(),
                Value::BulkString(height.as_bytes().to_vec()),
            );
        }
        StreamId {
            id: id.to_string(),
            map,
        }
    }

    #[test]
    fn test_decode_entry() {
        let queue: QueueKey = "q".into();
        let entry = decode_entry(&queue, &stream_id("1-0", Some("100"))).unwrap();
        assert_eq!(entry, LogEntry::new(EntryId::new(1, 0), 100));
    }

    #[test]
    fn test_decode_entry_without_height() {
        let queue: QueueKey = "q".into();
        let err = decode_entry(&queue, &stream_id("1-0", None)).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn test_decode_entry_bad_id() {
        let queue: QueueKey = "q".into();
        assert!(decode_entry(&queue, &stream_id("nope", Some("1"))).is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisLogStore::connect("not a url").await;
        assert!(matches!(result, Err(StoreError::Connection { .. })));
    }

    #[test]
    fn test_xrange_starts_at_smallest_id_inclusive() {
        let queue: QueueKey = "acct.near/myfn:real-time:stream".into();

        let cmd = xrange_cmd(&queue, EntryId::SMALLEST, Some(3));

        let expected = redis::cmd("XRANGE")
            .arg("acct.near/myfn:real-time:stream")
            .arg("0-0")
            .arg("+")
            .arg("COUNT")
            .arg(3)
            .get_packed_command();
        assert_eq!(cmd.get_packed_command(), expected);
    }

    #[test]
    fn test_scan_has_no_count() {
        let queue: QueueKey = "q".into();
        let cmd = xrange_cmd(&queue, EntryId::new(1700000000000, 2), None);

        let expected = redis::cmd("XRANGE")
            .arg("q")
            .arg("1700000000000-2")
            .arg("+")
            .get_packed_command();
        assert_eq!(cmd.get_packed_command(), expected);
    }

    #[test]
    fn test_xdel_targets_single_id() {
        let queue: QueueKey = "q".into();
        let cmd = xdel_cmd(&queue, EntryId::new(5, 1));

        let expected = redis::cmd("XDEL").arg("q").arg("5-1").get_packed_command();
        assert_eq!(cmd.get_packed_command(), expected);
    }

    #[tokio::test]
    #[ignore = "requires Redis server"]
    async fn test_real_store_read_and_acknowledge() {
        let store = RedisLogStore::connect("redis://127.0.0.1").await.unwrap();
        let queue: QueueKey = format!("stream-runner-test-{}:real-time:stream", std::process::id()).into();
        let mut conn = store.connection().unwrap();
        for (id, height) in [("1-0", 100u64), ("2-0", 101), ("3-0", 102)] {
            let _: String = redis::cmd("XADD")
                .arg(queue.as_str())
                .arg(id)
                .arg(BLOCK_HEIGHT_FIELD)
                .arg(height)
                .query_async(&mut conn)
                .await
                .unwrap();
        }

        let first = store.read_from(&queue, EntryId::SMALLEST, 2).await.unwrap();
        assert_eq!(first.iter().map(|e| e.block_height).collect::<Vec<_>>(), vec![100, 101]);

        // Inclusive lower bound
        let from_second = store.read_from(&queue, EntryId::new(2, 0), 1).await.unwrap();
        assert_eq!(from_second, vec![LogEntry::new(EntryId::new(2, 0), 101)]);

        store.acknowledge(&queue, EntryId::new(1, 0)).await.unwrap();
        let remaining = store.scan_unprocessed(&queue, EntryId::SMALLEST).await.unwrap();
        assert_eq!(remaining.len(), 2);

        let _: usize = conn.del(queue.as_str()).await.unwrap();
        store.release();
        assert!(matches!(store.list_queues().await, Err(StoreError::Closed)));
    }
}
