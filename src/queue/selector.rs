use chrono::{DateTime, Utc};

use crate::config::QueueOptions;
use crate::db::{Filter, FindOptions, RecordStore, SortField};
use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus};

/// Fetch the next batch, oldest `received_date` first.
///
/// With `continue_processing_on_error` unset the queue is strictly ordered:
/// while the oldest failed record is still backing off, nothing is returned.
pub async fn next_batch(
    store: &dyn RecordStore,
    options: &QueueOptions,
    now: DateTime<Utc>,
) -> Result<Vec<QueueRecord>, QueueError> {
    let eligible = Filter::And(vec![
        Filter::StatusIn(RecordStatus::PROCESSABLE.to_vec()),
        Filter::AvailableAtOrBefore(now),
    ]);

    let filter = if options.continue_processing_on_error {
        eligible
    } else {
        Filter::Or(vec![eligible, Filter::StatusIn(vec![RecordStatus::Failed])])
    };

    let records = store
        .find(
            &filter,
            FindOptions {
                sort: Some(SortField::ReceivedDate),
                limit: Some(options.batch_size),
            },
        )
        .await?;

    if options.continue_processing_on_error {
        return Ok(records);
    }

    Ok(prioritize(records, now))
}

/// Strict-mode ordering over a `received_date`-sorted fetch.
///
/// The earliest failed record is the head of line. If it is not yet
/// available the whole batch waits; otherwise any other record that is not
/// yet available is dropped.
pub fn prioritize(records: Vec<QueueRecord>, now: DateTime<Utc>) -> Vec<QueueRecord> {
    let head = records
        .iter()
        .filter(|r| r.status == RecordStatus::Failed)
        .min_by_key(|r| r.received_date);

    if let Some(head) = head {
        if head.available.is_some_and(|available| available > now) {
            tracing::debug!(
                "Batch held behind failed record {} until {:?}",
                head.id,
                head.available
            );
            return Vec::new();
        }
    }

    records
        .into_iter()
        .filter(|r| r.is_available_at(now))
        .collect()
}
