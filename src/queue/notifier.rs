use chrono::{DateTime, Utc};

use crate::db::{RecordField, RecordPatch, RecordStore};
use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus};

use super::handler::QueueHandler;

/// Result of handing a finished record to the failure hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Delivered,
    HookFailed,
}

/// Call the failure hook once and move the record to a terminal status.
///
/// A failing hook is logged and persisted as `notifyFailure`; it is never retried.
pub async fn notify(
    store: &dyn RecordStore,
    handler: &dyn QueueHandler,
    record: &QueueRecord,
    now: DateTime<Utc>,
) -> Result<Notification, QueueError> {
    let (patch, outcome) = match handler.on_failure(record).await {
        Ok(()) => (
            RecordPatch {
                status: Some(RecordStatus::Notified),
                processed_date: Some(now),
                unset: vec![RecordField::Available],
                ..Default::default()
            },
            Notification::Delivered,
        ),
        Err(e) => {
            tracing::error!("Failure notification for record {} failed: {e}", record.id);
            (
                RecordPatch {
                    status: Some(RecordStatus::NotifyFailure),
                    processed_date: Some(now),
                    notify_failure_reason: Some(serde_json::Value::String(e.message)),
                    unset: vec![RecordField::Available],
                    ..Default::default()
                },
                Notification::HookFailed,
            )
        }
    };

    super::processor::write_transition(store, record, patch).await?;
    Ok(outcome)
}
