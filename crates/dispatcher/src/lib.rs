//! # Dispatcher
//!
//! 队列发现与消费模块。
//!
//! 负责：
//! - 轮询 log store 获取队列列表
//! - 每个队列只启动一个 [`StreamHandle`]，注册后永不移除
//! - 每个 handler 按 id 顺序读取、处理并确认条目

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod processors;
pub mod registry;
pub mod stats;

pub use contracts::{LogStore, MessageProcessor};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::DispatcherError;
pub use handler::{HandlerConfig, StreamHandle};
pub use processors::LogProcessor;
pub use registry::HandlerRegistry;
pub use stats::{HandlerSnapshot, HandlerStats, HandlerStatus};
