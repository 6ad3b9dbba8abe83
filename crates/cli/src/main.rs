//! # Stream Runner CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 队列发现与 stream handler 生命周期管理
//! - 聚合后的 `/metrics` 端点
//! - 优雅关闭处理 (Ctrl+C/SIGTERM)

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_queues, run_worker};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Stream Runner CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_worker(args).await,
        Commands::Queues(args) => run_queues(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_tracing(&ObservabilityConfig {
        log_format: cli.log_format.into(),
        default_log_level: default_log_level.to_string(),
    })
}
