//! LogProcessor - logs an entry summary via tracing

use contracts::{MessageProcessor, ProcessError, ProcessingContext};
use tracing::{info, instrument};

/// Processor that only logs what it would have executed
pub struct LogProcessor {
    name: String,
}

impl LogProcessor {
    /// Create a new LogProcessor with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_entry_summary(&self, ctx: &ProcessingContext<'_>) {
        info!(
            processor = %self.name,
            function = %ctx.config.full_name(),
            id = %ctx.entry.id,
            block_height = ctx.entry.block_height,
            cached = ctx.cached.is_some(),
            payload_bytes = ctx.cached.map(|c| c.payload.len()).unwrap_or(0),
            "Entry received"
        );
    }
}

impl MessageProcessor for LogProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_processor_process",
        skip(self, ctx),
        fields(processor = %self.name, queue = %ctx.queue)
    )]
    async fn process(&self, ctx: ProcessingContext<'_>) -> Result<(), ProcessError> {
        self.log_entry_summary(&ctx);
        Ok(())
    }
}
