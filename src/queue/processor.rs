use chrono::{DateTime, Utc};

use crate::config::QueueOptions;
use crate::db::{RecordField, RecordPatch, RecordStore};
use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus};

use super::backoff;
use super::handler::{HandlerError, QueueHandler};
use super::notifier::{self, Notification};

/// What happened to a single record during a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Succeeded,
    Skipped,
    /// Ordinary failure; the record will be retried after backoff.
    Retrying,
    Notified,
    NotifyFailed,
}

/// Whether the orchestrator may move on to the next record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Drive one record through the handler and persist the resulting transition.
pub async fn process_record(
    store: &dyn RecordStore,
    handler: &dyn QueueHandler,
    options: &QueueOptions,
    record: &QueueRecord,
) -> Result<(RecordOutcome, Flow), QueueError> {
    if is_exhausted(record, options) {
        tracing::debug!(
            "Record {} is out of retries (retry_count={}), notifying",
            record.id,
            record.retry_count
        );
        let notification = notifier::notify(store, handler, record, Utc::now()).await?;
        return Ok((notification.into(), Flow::Continue));
    }

    tracing::debug!(
        "Processing record {} (status={}, retry_count={})",
        record.id,
        record.status,
        record.retry_count
    );

    let result = handler.process(record).await;
    let now = Utc::now();

    match result {
        Ok(info) => {
            write_transition(store, record, succeeded(info, now)).await?;
            Ok((RecordOutcome::Succeeded, Flow::Continue))
        }
        Err(HandlerError::Skip { delay_ms }) => {
            tracing::debug!("Record {} skipped for {delay_ms}ms", record.id);
            write_transition(store, record, skipped(delay_ms, now)).await?;
            Ok((RecordOutcome::Skipped, Flow::Continue))
        }
        Err(HandlerError::Fail(reason)) => {
            tracing::warn!("Record {} failed permanently: {reason}", record.id);
            write_transition(store, record, failed_immediately(reason, now)).await?;

            // notify with the persisted failure fields
            let failed = store
                .find_by_id(record.id)
                .await?
                .ok_or(QueueError::RecordNotFound(record.id))?;
            let notification = notifier::notify(store, handler, &failed, Utc::now()).await?;
            Ok((notification.into(), Flow::Continue))
        }
        Err(HandlerError::Transient(detail)) => {
            let delay = backoff::delay_ms(record.retry_count, options);
            tracing::warn!(
                "Record {} failed (attempt {}), retrying in {delay}ms: {detail}",
                record.id,
                record.retry_count + 1
            );
            write_transition(store, record, failed_for_retry(record, detail, delay, now)).await?;

            let flow = if options.continue_processing_on_error {
                Flow::Continue
            } else {
                Flow::Halt
            };
            Ok((RecordOutcome::Retrying, flow))
        }
    }
}

fn is_exhausted(record: &QueueRecord, options: &QueueOptions) -> bool {
    let out_of_retries = options.has_retry_limit() && record.retry_count >= options.retry_limit;
    // a fail signal that was persisted but never notified
    let unnotified_failure = record.status == RecordStatus::Failed && record.immediate_failure;
    out_of_retries || unnotified_failure
}

fn succeeded(info: Option<serde_json::Value>, now: DateTime<Utc>) -> RecordPatch {
    RecordPatch {
        status: Some(RecordStatus::Processed),
        processed_date: Some(now),
        additional_info: info.filter(|v| !is_empty_info(v)),
        unset: vec![
            RecordField::FailureReason,
            RecordField::RetryCount,
            RecordField::Available,
        ],
        ..Default::default()
    }
}

fn skipped(delay_ms: i64, now: DateTime<Utc>) -> RecordPatch {
    RecordPatch {
        status: Some(RecordStatus::Skipped),
        processed_date: Some(now),
        available: Some(backoff::available_after(now, delay_ms)),
        ..Default::default()
    }
}

/// Leaves `available` as is; the record is routed to the notifier right away.
fn failed_immediately(reason: serde_json::Value, now: DateTime<Utc>) -> RecordPatch {
    RecordPatch {
        status: Some(RecordStatus::Failed),
        processed_date: Some(now),
        failure_reason: Some(reason),
        immediate_failure: Some(true),
        ..Default::default()
    }
}

fn failed_for_retry(
    record: &QueueRecord,
    detail: serde_json::Value,
    delay_ms: i64,
    now: DateTime<Utc>,
) -> RecordPatch {
    RecordPatch {
        status: Some(RecordStatus::Failed),
        processed_date: Some(now),
        failure_reason: Some(detail),
        available: Some(backoff::available_after(now, delay_ms)),
        retry_count: Some(record.retry_count.saturating_add(1)),
        ..Default::default()
    }
}

fn is_empty_info(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Persist `patch` on `record` if the status change is an allowed transition.
pub(crate) async fn write_transition(
    store: &dyn RecordStore,
    record: &QueueRecord,
    patch: RecordPatch,
) -> Result<(), QueueError> {
    if let Some(next) = patch.status {
        if !record.status.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }
    }

    match store.update_one(record.id, &patch).await? {
        0 => Err(QueueError::RecordNotFound(record.id)),
        _ => Ok(()),
    }
}

impl From<Notification> for RecordOutcome {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::Delivered => RecordOutcome::Notified,
            Notification::HookFailed => RecordOutcome::NotifyFailed,
        }
    }
}
