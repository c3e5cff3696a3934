//! Record store adapter.
//!
//! The queue talks to its backing collection only through [`RecordStore`].
//! Filters and patches are small typed vocabularies so every backend can
//! evaluate them the same way: [`memory`] in-process, [`postgres`] as SQL.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus, StatusCount};

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

/// Query predicate over queue records.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    StatusIn(Vec<RecordStatus>),
    IdIn(Vec<Uuid>),
    /// `available <= at`; records without `available` never match.
    AvailableAtOrBefore(DateTime<Utc>),
    /// `processed_date <= at`; records without `processed_date` never match.
    ProcessedAtOrBefore(DateTime<Utc>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn matches(&self, record: &QueueRecord) -> bool {
        match self {
            Filter::StatusIn(statuses) => statuses.contains(&record.status),
            Filter::IdIn(ids) => ids.contains(&record.id),
            Filter::AvailableAtOrBefore(at) => record.available.is_some_and(|a| a <= *at),
            Filter::ProcessedAtOrBefore(at) => record.processed_date.is_some_and(|p| p <= *at),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// Single-field ascending sort keys. Ties keep insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ReceivedDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindOptions {
    pub sort: Option<SortField>,
    pub limit: Option<i64>,
}

/// Fields that a [`RecordPatch`] can clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Available,
    ProcessedDate,
    RetryCount,
    FailureReason,
    ImmediateFailure,
    AdditionalInfo,
    NotifyFailureReason,
    ResetDate,
}

/// A set/unset update applied atomically to one or more records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<RecordStatus>,
    pub received_date: Option<DateTime<Utc>>,
    pub available: Option<DateTime<Utc>>,
    pub processed_date: Option<DateTime<Utc>>,
    pub retry_count: Option<i32>,
    pub failure_reason: Option<serde_json::Value>,
    pub immediate_failure: Option<bool>,
    pub additional_info: Option<serde_json::Value>,
    pub notify_failure_reason: Option<serde_json::Value>,
    pub reset_date: Option<DateTime<Utc>>,
    pub unset: Vec<RecordField>,
}

impl RecordPatch {
    /// Apply the patch in place. Unsets run after sets.
    pub fn apply(&self, record: &mut QueueRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(at) = self.received_date {
            record.received_date = at;
        }
        if let Some(at) = self.available {
            record.available = Some(at);
        }
        if let Some(at) = self.processed_date {
            record.processed_date = Some(at);
        }
        if let Some(count) = self.retry_count {
            record.retry_count = count;
        }
        if let Some(reason) = &self.failure_reason {
            record.failure_reason = Some(reason.clone());
        }
        if let Some(flag) = self.immediate_failure {
            record.immediate_failure = flag;
        }
        if let Some(info) = &self.additional_info {
            record.additional_info = Some(info.clone());
        }
        if let Some(reason) = &self.notify_failure_reason {
            record.notify_failure_reason = Some(reason.clone());
        }
        if let Some(at) = self.reset_date {
            record.reset_date = Some(at);
        }

        for field in &self.unset {
            match field {
                RecordField::Available => record.available = None,
                RecordField::ProcessedDate => record.processed_date = None,
                RecordField::RetryCount => record.retry_count = 0,
                RecordField::FailureReason => record.failure_reason = None,
                RecordField::ImmediateFailure => record.immediate_failure = false,
                RecordField::AdditionalInfo => record.additional_info = None,
                RecordField::NotifyFailureReason => record.notify_failure_reason = None,
                RecordField::ResetDate => record.reset_date = None,
            }
        }
    }
}

/// Fields supplied when a record is first stored; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub status: RecordStatus,
    pub received_date: DateTime<Utc>,
    pub available: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl NewRecord {
    pub fn received(data: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            status: RecordStatus::Received,
            received_date: now,
            available: now,
            data,
        }
    }
}

/// Narrow interface over one logical collection of queue records.
///
/// Every update targets exact ids; backends must apply a patch to a single
/// record atomically.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: NewRecord) -> Result<QueueRecord, QueueError>;

    async fn find(
        &self,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<QueueRecord>, QueueError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueRecord>, QueueError>;

    /// Returns the number of matched records (0 or 1).
    async fn update_one(&self, id: Uuid, patch: &RecordPatch) -> Result<u64, QueueError>;

    /// Returns the number of matched records.
    async fn update_many(&self, ids: &[Uuid], patch: &RecordPatch) -> Result<u64, QueueError>;

    /// Returns the number of deleted records.
    async fn delete_many(&self, filter: &Filter) -> Result<u64, QueueError>;

    /// Current record count per status. Statuses with no records are omitted.
    async fn count_by_status(&self) -> Result<Vec<StatusCount>, QueueError>;

    /// Best effort; implementations log failures instead of returning them.
    async fn ensure_indexes(&self);
}
