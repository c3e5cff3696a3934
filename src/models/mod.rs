pub mod queue_record;

pub use queue_record::{QueueRecord, RecordStatus, StatusCount};
