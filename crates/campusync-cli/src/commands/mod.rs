pub mod config;
pub mod fetch;
pub mod prompt;
pub mod queue;
pub mod sync;
pub mod watch;

use std::sync::Arc;

use campusync_core::sync::PENDING_ACTIONS_KEY;
use campusync_core::{Config, EventBus, KeyValueStore, PendingActionQueue, SqliteStore};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Durable store in the data directory.
pub fn open_store() -> Result<Arc<dyn KeyValueStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open_default()?))
}

/// Queue handle over the durable store. No listeners are attached.
pub fn open_queue(config: &Config) -> Result<PendingActionQueue, Box<dyn std::error::Error>> {
    Ok(PendingActionQueue::new(
        open_store()?,
        config.storage_key(PENDING_ACTIONS_KEY),
        EventBus::new(),
    ))
}
