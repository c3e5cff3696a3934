use uuid::Uuid;

use crate::models::RecordStatus;

/// Infrastructure errors that abort a queue operation.
///
/// Handler outcomes (skip, fail, transient) never surface here; they are
/// persisted on the record instead.
#[derive(Debug)]
pub enum QueueError {
    Database(sqlx::Error),
    Store(String),
    PreHook(String),
    InvalidTransition {
        from: RecordStatus,
        to: RecordStatus,
    },
    RecordNotFound(Uuid),
    Config(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Database(err) => write!(f, "Database Error: {err}"),
            QueueError::Store(msg) => write!(f, "Store Error: {msg}"),
            QueueError::PreHook(msg) => write!(f, "Pre-hook Error: {msg}"),
            QueueError::InvalidTransition { from, to } => {
                write!(f, "Invalid Transition: {from} -> {to}")
            }
            QueueError::RecordNotFound(id) => write!(f, "Record Not Found: {id}"),
            QueueError::Config(msg) => write!(f, "Config Error: {msg}"),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueueError::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Database(err)
    }
}
