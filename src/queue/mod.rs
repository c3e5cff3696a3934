//! Retry queue: batch orchestration plus maintenance operations.

pub mod backoff;
pub mod handler;
pub mod notifier;
pub mod processor;
pub mod selector;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::QueueOptions;
use crate::db::{Filter, NewRecord, RecordField, RecordPatch, RecordStore};
use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus, StatusCount};

pub use handler::{HandlerError, HookError, QueueHandler};
pub use processor::{Flow, RecordOutcome};

pub type SharedQueue = Arc<RetryQueue>;

/// Counts for one `process_next_batch` tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub notified: usize,
    pub notify_failed: usize,
    /// A failure stopped the batch before every selected record ran.
    pub halted: bool,
}

impl BatchSummary {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Succeeded => self.succeeded += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Retrying => self.failed += 1,
            RecordOutcome::Notified => self.notified += 1,
            RecordOutcome::NotifyFailed => self.notify_failed += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.notified + self.notify_failed
    }
}

/// Persistent at-least-once retry queue over a [`RecordStore`].
///
/// Only one instance may process a given collection; there is no
/// cross-process locking.
pub struct RetryQueue {
    store: Arc<dyn RecordStore>,
    handler: Arc<dyn QueueHandler>,
    options: QueueOptions,
    running: AtomicBool,
}

/// Clears the running flag when a tick ends, including on error.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RetryQueue {
    pub fn new(
        store: Arc<dyn RecordStore>,
        handler: Arc<dyn QueueHandler>,
        options: QueueOptions,
    ) -> Result<Self, QueueError> {
        options.validate().map_err(QueueError::Config)?;
        Ok(Self {
            store,
            handler,
            options,
            running: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn ensure_indexes(&self) {
        self.store.ensure_indexes().await;
    }

    /// Store a new record in `received` status, available immediately.
    pub async fn enqueue(&self, data: serde_json::Value) -> Result<QueueRecord, QueueError> {
        let record = self.store.insert(NewRecord::received(data, Utc::now())).await?;
        tracing::debug!("Enqueued record {}", record.id);
        Ok(record)
    }

    /// Run one batch tick.
    ///
    /// Returns `Ok(None)` without doing anything if a previous tick on this
    /// queue is still running.
    pub async fn process_next_batch(&self) -> Result<Option<BatchSummary>, QueueError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tracing::debug!("Previous batch still running, skipping tick");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);

        self.handler
            .before_batch()
            .await
            .map_err(|e| QueueError::PreHook(e.message))?;

        let batch = selector::next_batch(self.store.as_ref(), &self.options, Utc::now()).await?;
        let mut summary = BatchSummary {
            selected: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            return Ok(Some(summary));
        }
        tracing::info!("Processing batch of {} records", batch.len());

        for record in &batch {
            let (outcome, flow) = processor::process_record(
                self.store.as_ref(),
                self.handler.as_ref(),
                &self.options,
                record,
            )
            .await?;
            summary.record(outcome);

            if flow == Flow::Halt {
                tracing::info!(
                    "Stopping batch after failure of record {} to preserve ordering",
                    record.id
                );
                summary.halted = summary.attempted() < summary.selected;
                break;
            }
        }

        Ok(Some(summary))
    }

    /// Delete `processed` records older than `max_record_age`.
    pub async fn cleanup(&self) -> Result<u64, QueueError> {
        let max_age = Duration::from_std(self.options.max_record_age)
            .map_err(|e| QueueError::Config(format!("Invalid max_record_age: {e}")))?;
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .ok_or_else(|| {
                QueueError::Config("max_record_age reaches past the earliest date".to_string())
            })?;

        let deleted = self
            .store
            .delete_many(&Filter::And(vec![
                Filter::StatusIn(vec![RecordStatus::Processed]),
                Filter::ProcessedAtOrBefore(cutoff),
            ]))
            .await?;

        if deleted > 0 {
            tracing::info!("Cleaned up {deleted} processed records");
        }
        Ok(deleted)
    }

    /// Put records back to their initial state. Returns the matched count.
    pub async fn reset_records(&self, ids: &[Uuid]) -> Result<u64, QueueError> {
        let now = Utc::now();
        let patch = RecordPatch {
            status: Some(RecordStatus::Received),
            received_date: Some(now),
            available: Some(now),
            reset_date: Some(now),
            unset: vec![
                RecordField::ProcessedDate,
                RecordField::FailureReason,
                RecordField::RetryCount,
                RecordField::ImmediateFailure,
                RecordField::NotifyFailureReason,
            ],
            ..Default::default()
        };

        let matched = self.store.update_many(ids, &patch).await?;
        tracing::info!("Reset {matched} of {} requested records", ids.len());
        Ok(matched)
    }

    /// Current record count per status.
    pub async fn status_counts(&self) -> Result<Vec<StatusCount>, QueueError> {
        self.store.count_by_status().await
    }

    /// Hand the current status counts to the handler's status hook.
    pub async fn statuses_check(&self) -> Result<Vec<StatusCount>, QueueError> {
        let counts = self.status_counts().await?;
        if let Err(e) = self.handler.on_statuses(&counts).await {
            tracing::warn!("Status hook failed: {e}");
        }
        Ok(counts)
    }
}
