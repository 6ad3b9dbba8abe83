//! Stream runner instruments
//!
//! Thin helpers over the `metrics` facade. Every per-queue instrument
//! carries a `queue` and a `type` (processing mode) label.

use contracts::{ProcessingMode, QueueKey};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Time an entry waited in its queue before a handler picked it up
pub const ENTRY_WAIT_DURATION: &str = "stream_runner_entry_wait_duration_milliseconds";
/// Cached block found
pub const CACHE_HIT: &str = "stream_runner_cache_hit_total";
/// Cached block missing
pub const CACHE_MISS: &str = "stream_runner_cache_miss_total";
/// Entries not yet acknowledged
pub const UNPROCESSED_ENTRIES: &str = "stream_runner_unprocessed_entries";
/// Block height of the last acknowledged entry
pub const LAST_PROCESSED_BLOCK_HEIGHT: &str = "stream_runner_last_processed_block_height";
/// Time spent in the processing step
pub const EXECUTION_DURATION: &str = "stream_runner_execution_duration_milliseconds";
/// Entries the processing step failed on
pub const PROCESSING_FAILURES: &str = "stream_runner_processing_failures_total";
/// Handlers registered by this process
pub const HANDLERS: &str = "stream_runner_handlers";

/// Histogram buckets (milliseconds), shared by every histogram
pub const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
    30_000.0, 60_000.0, 300_000.0,
];

/// Register HELP text and units with the installed recorder
pub fn describe_metrics() {
    describe_histogram!(
        ENTRY_WAIT_DURATION,
        Unit::Milliseconds,
        "Time an entry waited in its queue before being picked up"
    );
    describe_counter!(CACHE_HIT, "The number of times the block cache was hit");
    describe_counter!(CACHE_MISS, "The number of times the block cache was missed");
    describe_gauge!(
        UNPROCESSED_ENTRIES,
        "Number of queue entries not yet processed"
    );
    describe_gauge!(
        LAST_PROCESSED_BLOCK_HEIGHT,
        "Block height of the last entry processed by a handler"
    );
    describe_histogram!(
        EXECUTION_DURATION,
        Unit::Milliseconds,
        "Time taken to process one entry"
    );
    describe_counter!(
        PROCESSING_FAILURES,
        "The number of entries the processing step failed on"
    );
    describe_gauge!(HANDLERS, "Stream handlers registered by this worker");
}

fn labels(queue: &QueueKey, mode: ProcessingMode) -> [(&'static str, String); 2] {
    [
        ("queue", queue.to_string()),
        ("type", mode.as_str().to_string()),
    ]
}

/// Record how long an entry waited before pickup
pub fn record_entry_wait_ms(queue: &QueueKey, mode: ProcessingMode, wait_ms: f64) {
    histogram!(ENTRY_WAIT_DURATION, &labels(queue, mode)).record(wait_ms);
}

/// Record a block cache lookup
pub fn record_cache_lookup(queue: &QueueKey, mode: ProcessingMode, hit: bool) {
    let name = if hit { CACHE_HIT } else { CACHE_MISS };
    counter!(name, &labels(queue, mode)).increment(1);
}

/// Record the current backlog of a queue
pub fn record_unprocessed_entries(queue: &QueueKey, mode: ProcessingMode, count: usize) {
    gauge!(UNPROCESSED_ENTRIES, &labels(queue, mode)).set(count as f64);
}

/// Record the height of the entry just acknowledged
pub fn record_last_processed_block_height(queue: &QueueKey, mode: ProcessingMode, height: u64) {
    gauge!(LAST_PROCESSED_BLOCK_HEIGHT, &labels(queue, mode)).set(height as f64);
}

/// Record processing step duration
pub fn record_execution_duration_ms(queue: &QueueKey, mode: ProcessingMode, duration_ms: f64) {
    histogram!(EXECUTION_DURATION, &labels(queue, mode)).record(duration_ms);
}

/// Record a processing step failure
pub fn record_processing_failure(queue: &QueueKey, mode: ProcessingMode) {
    counter!(PROCESSING_FAILURES, &labels(queue, mode)).increment(1);
}

/// Record the number of registered handlers
pub fn record_handler_count(count: usize) {
    gauge!(HANDLERS).set(count as f64);
}
