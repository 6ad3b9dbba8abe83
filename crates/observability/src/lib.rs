//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - 进程内 Prometheus recorder 与指标记录函数
//! - Worker 快照注册与跨进程聚合
//! - `GET /metrics` 端点，返回合并后的视图
//!
//! ## 使用示例
//!
//! ```ignore
//! let handle = observability::install_recorder()?;
//! let store = observability::InMemorySnapshotStore::new();
//! observability::WorkerReporter::new("1", handle, store.clone(), interval).spawn();
//! observability::serve(9180, observability::MetricsAggregator::new(store)).await?;
//! ```

pub mod aggregate;
pub mod exposition;
pub mod metrics;
pub mod server;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::aggregate::{InMemorySnapshotStore, MetricsAggregator, WorkerReporter};
pub use crate::exposition::{merge_all, Exposition, ExpositionError, CONTENT_TYPE};
pub use crate::metrics::{
    describe_metrics, record_cache_lookup, record_entry_wait_ms, record_execution_duration_ms,
    record_handler_count, record_last_processed_block_height, record_processing_failure,
    record_unprocessed_entries,
};
pub use crate::server::{router, serve};
pub use metrics_exporter_prometheus::PrometheusHandle;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Default log level when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs
    #[default]
    Json,
    /// Human-readable
    Pretty,
    /// Compact single line
    Compact,
}

/// Initialize tracing with the given configuration
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(log_format = ?config.log_format, "Tracing initialized");
    Ok(())
}

/// Install the process-wide Prometheus recorder.
///
/// No HTTP listener is started here: the handle's rendering is what the
/// worker publishes as its snapshot, and the aggregating endpoint serves
/// the merged result.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets(metrics::DURATION_BUCKETS_MS)
        .context("Invalid histogram buckets")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_metrics();

    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}
