//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

use dispatcher::{DispatcherConfig, HandlerConfig};

use crate::error::CliError;

/// Stream Runner - consumes indexer queues from Redis streams
#[derive(Parser, Debug)]
#[command(
    name = "stream-runner",
    author,
    version,
    about = "Redis stream queue runner",
    long_about = "Discovers queues registered in the `streams` set, runs one stream handler \n\
                  per queue, and serves aggregated Prometheus metrics for the worker fleet."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "STREAM_RUNNER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "json",
        global = true,
        env = "STREAM_RUNNER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover queues and process them until interrupted
    Run(RunArgs),

    /// List discovered queues with their backlog
    Queues(QueuesArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Redis connection string
    #[arg(
        long,
        default_value = "redis://127.0.0.1",
        env = "REDIS_CONNECTION_STRING"
    )]
    pub redis_connection_string: String,

    /// Metrics server port
    #[arg(long, default_value = "9180", env = "PORT")]
    pub port: u16,

    /// Queue discovery interval in milliseconds
    #[arg(long, default_value = "500", env = "STREAM_RUNNER_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Entries read per batch
    #[arg(long, default_value = "1", env = "STREAM_RUNNER_BATCH_SIZE")]
    pub batch_size: usize,

    /// Sleep when a queue is empty, in milliseconds
    #[arg(long, default_value = "100", env = "STREAM_RUNNER_IDLE_INTERVAL_MS")]
    pub idle_interval_ms: u64,

    /// Sleep after a processing failure, in milliseconds
    #[arg(long, default_value = "10000", env = "STREAM_RUNNER_FAILURE_BACKOFF_MS")]
    pub failure_backoff_ms: u64,

    /// Identifier this worker reports its metrics under (default: process id)
    #[arg(long, env = "WORKER_ID")]
    pub worker_id: Option<String>,

    /// Metrics snapshot interval in milliseconds
    #[arg(long, default_value = "1000", env = "STREAM_RUNNER_REPORT_INTERVAL_MS")]
    pub report_interval_ms: u64,

    /// Publish metrics snapshots to Redis so any worker can serve the fleet view
    #[arg(long, env = "STREAM_RUNNER_SHARED_METRICS")]
    pub shared_metrics: bool,
}

impl RunArgs {
    /// Reject settings that would stall handlers or spin the discovery loop
    pub fn validate(&self) -> Result<(), CliError> {
        if self.batch_size == 0 {
            return Err(CliError::invalid_argument("batch-size", "must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(CliError::invalid_argument(
                "poll-interval-ms",
                "must be at least 1",
            ));
        }
        if self.report_interval_ms == 0 {
            return Err(CliError::invalid_argument(
                "report-interval-ms",
                "must be at least 1",
            ));
        }
        if matches!(self.worker_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(CliError::invalid_argument("worker-id", "must not be empty"));
        }
        Ok(())
    }

    pub fn worker_id(&self) -> String {
        self.worker_id
            .clone()
            .unwrap_or_else(|| std::process::id().to_string())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            handler: HandlerConfig {
                batch_size: self.batch_size,
                idle_interval: Duration::from_millis(self.idle_interval_ms),
                failure_backoff: Duration::from_millis(self.failure_backoff_ms),
            },
        }
    }
}

/// Arguments for the `queues` command
#[derive(Parser, Debug)]
pub struct QueuesArgs {
    /// Redis connection string
    #[arg(
        long,
        default_value = "redis://127.0.0.1",
        env = "REDIS_CONNECTION_STRING"
    )]
    pub redis_connection_string: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    #[default]
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
