use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordStatus {
    Received,
    Failed,
    Skipped,
    Processed,
    Notified,
    NotifyFailure,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 6] = [
        RecordStatus::Received,
        RecordStatus::Failed,
        RecordStatus::Skipped,
        RecordStatus::Processed,
        RecordStatus::Notified,
        RecordStatus::NotifyFailure,
    ];

    /// Statuses the batch selector may pick up.
    pub const PROCESSABLE: [RecordStatus; 3] = [
        RecordStatus::Received,
        RecordStatus::Failed,
        RecordStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Received => "received",
            RecordStatus::Failed => "failed",
            RecordStatus::Skipped => "skipped",
            RecordStatus::Processed => "processed",
            RecordStatus::Notified => "notified",
            RecordStatus::NotifyFailure => "notifyFailure",
        }
    }

    pub fn is_processable(&self) -> bool {
        Self::PROCESSABLE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_processable()
    }

    /// Automatic transitions the processor and notifier may write.
    ///
    /// Terminal statuses have no outgoing edges; only a manual reset brings
    /// a record back to `received`, and reset does not consult this table.
    pub fn can_transition_to(&self, next: RecordStatus) -> bool {
        use RecordStatus::*;

        match (self, next) {
            (Received | Failed | Skipped, Processed) => true,
            (Received | Failed | Skipped, Skipped) => true,
            (Received | Failed | Skipped, Failed) => true,
            (Received | Failed | Skipped, Notified | NotifyFailure) => true,
            (_, Received) => false,
            (Processed | Notified | NotifyFailure, _) => false,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown record status: {s}"))
    }
}

/// A unit of queued work.
///
/// `available` is set while the status is processable and cleared once the
/// record reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub id: Uuid,
    pub status: RecordStatus,
    pub received_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_date: Option<DateTime<Utc>>,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<serde_json::Value>,
    pub immediate_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_failure_reason: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_date: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl QueueRecord {
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.available.is_some_and(|available| available <= now)
    }
}

/// Number of records currently holding `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: RecordStatus,
    pub count: i64,
}
