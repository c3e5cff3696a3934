pub mod config;
pub mod error;
pub mod db;
pub mod models;
pub mod queue;
pub mod handlers;
pub mod worker;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::PgRecordStore;
use crate::error::QueueError;
use crate::handlers::WebhookHandler;
use crate::queue::{RetryQueue, SharedQueue};

pub use crate::models::{QueueRecord, RecordStatus, StatusCount};
pub use crate::queue::{BatchSummary, HandlerError, HookError, QueueHandler};

/// Build the daemon's queue: Postgres store plus the webhook handler.
/// Creates the collection table and its indexes if missing.
pub async fn build_queue(pool: PgPool, config: &Config) -> Result<SharedQueue, QueueError> {
    let store = PgRecordStore::new(pool, &config.queue.collection_name);
    store.ensure_schema().await?;

    let handler = WebhookHandler::new(&config.webhook).map_err(QueueError::Config)?;
    let queue = RetryQueue::new(Arc::new(store), Arc::new(handler), config.queue.clone())?;
    queue.ensure_indexes().await;

    Ok(Arc::new(queue))
}
