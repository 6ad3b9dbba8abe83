//! Per-handler statistics

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Lifecycle state of a stream handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerStatus {
    /// Loading queue configuration
    Starting = 0,
    /// Consuming entries
    Running = 1,
    /// Configuration unavailable; retrying without processing entries
    Failed = 2,
    /// Store client released
    Stopped = 3,
}

impl HandlerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

/// Statistics for a single stream handler
#[derive(Debug, Default)]
pub struct HandlerStats {
    status: AtomicU8,
    /// Entries processed and acknowledged
    processed_count: AtomicU64,
    /// Processing step failures
    failure_count: AtomicU64,
    /// Block height of the last acknowledged entry
    last_block_height: AtomicU64,
    /// Unprocessed entries at the last scan
    backlog: AtomicUsize,
}

impl HandlerStats {
    /// Create new stats instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> HandlerStatus {
        HandlerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: HandlerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }

    /// Count an acknowledged entry
    pub fn record_processed(&self, block_height: u64) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        self.last_block_height.store(block_height, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_block_height(&self) -> u64 {
        self.last_block_height.load(Ordering::Relaxed)
    }

    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Relaxed)
    }

    pub fn set_backlog(&self, backlog: usize) {
        self.backlog.store(backlog, Ordering::Relaxed);
    }

    /// Get snapshot of all stats
    pub fn snapshot(&self) -> HandlerSnapshot {
        HandlerSnapshot {
            status: self.status(),
            processed_count: self.processed_count(),
            failure_count: self.failure_count(),
            last_block_height: self.last_block_height(),
            backlog: self.backlog(),
        }
    }
}

/// Snapshot of handler stats (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct HandlerSnapshot {
    pub status: HandlerStatus,
    pub processed_count: u64,
    pub failure_count: u64,
    pub last_block_height: u64,
    pub backlog: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_starting_state() {
        let stats = HandlerStats::new();
        assert_eq!(stats.status(), HandlerStatus::Starting);
        assert_eq!(stats.processed_count(), 0);
    }

    #[test]
    fn test_record_processed_tracks_height() {
        let stats = HandlerStats::new();
        stats.record_processed(100);
        stats.record_processed(101);
        stats.set_status(HandlerStatus::Running);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed_count, 2);
        assert_eq!(snapshot.last_block_height, 101);
        assert_eq!(snapshot.status, HandlerStatus::Running);
    }
}
