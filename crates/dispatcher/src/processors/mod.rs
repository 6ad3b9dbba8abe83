//! Built-in message processors

mod log;

pub use log::LogProcessor;
