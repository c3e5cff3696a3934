use async_trait::async_trait;

use crate::models::{QueueRecord, StatusCount};

/// Non-success outcome of a record handler.
///
/// `Skip` and `Fail` are control signals recognised by variant; every other
/// error is `Transient` and retried with backoff.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// Defer the record for `delay_ms` without counting a retry.
    Skip { delay_ms: i64 },
    /// Give up on the record now and send it to the failure hook.
    Fail(serde_json::Value),
    Transient(serde_json::Value),
}

impl HandlerError {
    pub fn skip() -> Self {
        HandlerError::Skip { delay_ms: 0 }
    }

    pub fn skip_for(delay_ms: i64) -> Self {
        HandlerError::Skip { delay_ms }
    }

    pub fn fail(reason: impl Into<serde_json::Value>) -> Self {
        HandlerError::Fail(reason.into())
    }

    pub fn transient(detail: impl std::fmt::Display) -> Self {
        HandlerError::Transient(serde_json::Value::String(detail.to_string()))
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Skip { delay_ms } => write!(f, "skip for {delay_ms}ms"),
            HandlerError::Fail(reason) => write!(f, "fail: {reason}"),
            HandlerError::Transient(detail) => write!(f, "{detail}"),
        }
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError::Transient(serde_json::Value::String(s))
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError::Transient(serde_json::Value::String(s.to_string()))
    }
}

/// Error raised by the failure, pre-batch, or status hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct HookError {
    pub message: String,
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<String> for HookError {
    fn from(s: String) -> Self {
        HookError { message: s }
    }
}

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        HookError {
            message: s.to_string(),
        }
    }
}

/// User-supplied callbacks driving a [`super::RetryQueue`].
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Process one record. `Ok(Some(info))` is stored as `additionalInfo`.
    async fn process(&self, record: &QueueRecord)
    -> Result<Option<serde_json::Value>, HandlerError>;

    /// Called once a record can no longer be retried.
    async fn on_failure(&self, record: &QueueRecord) -> Result<(), HookError>;

    /// Runs before each batch is fetched; an error aborts the batch.
    async fn before_batch(&self) -> Result<(), HookError> {
        Ok(())
    }

    async fn on_statuses(&self, counts: &[StatusCount]) -> Result<(), HookError> {
        let summary = counts
            .iter()
            .map(|c| format!("{}={}", c.status, c.count))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("Queue statuses: {summary}");
        Ok(())
    }
}
