//! Command implementations.

mod queues;
mod run;

pub use queues::run_queues;
pub use run::run_worker;

use std::ops::Deref;

use contracts::LogStore;
use log_store::RedisLogStore;
use tracing::{debug, info};

use crate::error::CliError;

/// Open a Redis-backed store, logging the target without credentials
async fn connect(connection_string: &str) -> Result<RedisLogStore, CliError> {
    let target = connection_string
        .rsplit_once('@')
        .map_or(connection_string, |(_, host)| host);
    info!(redis = %target, "Connecting to Redis");

    RedisLogStore::connect(connection_string)
        .await
        .map_err(CliError::StoreConnection)
}

/// Releases the wrapped store when dropped, including on `?` early returns
struct ReleaseOnDrop<S: LogStore>(S);

impl<S: LogStore> Deref for ReleaseOnDrop<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S: LogStore> Drop for ReleaseOnDrop<S> {
    fn drop(&mut self) {
        self.0.release();
        debug!("Store connection released");
    }
}
