#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use requeue::config::QueueOptions;
use requeue::db::{MemoryRecordStore, RecordStore};
use requeue::models::{QueueRecord, RecordStatus, StatusCount};
use requeue::queue::{HandlerError, HookError, QueueHandler, RetryQueue};

type Script = dyn Fn(&QueueRecord) -> Result<Option<Value>, HandlerError> + Send + Sync;

/// Handler whose `process` result is decided by a closure; records every call.
pub struct ScriptedHandler {
    script: Box<Script>,
    pub processed: Mutex<Vec<Uuid>>,
    pub notified: Mutex<Vec<QueueRecord>>,
    pub statuses: Mutex<Vec<Vec<StatusCount>>>,
    pub pre_hook_calls: AtomicUsize,
    pub fail_notifications: bool,
    pub fail_pre_hook: bool,
    pub process_delay: Option<Duration>,
}

impl ScriptedHandler {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&QueueRecord) -> Result<Option<Value>, HandlerError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            processed: Mutex::new(Vec::new()),
            notified: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            pre_hook_calls: AtomicUsize::new(0),
            fail_notifications: false,
            fail_pre_hook: false,
            process_delay: None,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| Ok(None))
    }

    pub fn process_calls(&self) -> usize {
        self.processed.lock().unwrap().len()
    }

    pub fn notifications(&self) -> Vec<QueueRecord> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueHandler for ScriptedHandler {
    async fn process(&self, record: &QueueRecord) -> Result<Option<Value>, HandlerError> {
        self.processed.lock().unwrap().push(record.id);
        if let Some(delay) = self.process_delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(record)
    }

    async fn on_failure(&self, record: &QueueRecord) -> Result<(), HookError> {
        self.notified.lock().unwrap().push(record.clone());
        if self.fail_notifications {
            return Err(HookError::from("hook down"));
        }
        Ok(())
    }

    async fn before_batch(&self) -> Result<(), HookError> {
        self.pre_hook_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pre_hook {
            return Err(HookError::from("quota exhausted"));
        }
        Ok(())
    }

    async fn on_statuses(&self, counts: &[StatusCount]) -> Result<(), HookError> {
        self.statuses.lock().unwrap().push(counts.to_vec());
        Ok(())
    }
}

/// Strict mode, no backoff delay, retry limit 3.
pub fn options() -> QueueOptions {
    QueueOptions {
        batch_size: 10,
        retry_limit: 3,
        backoff_ms: 0,
        continue_processing_on_error: false,
        ..Default::default()
    }
}

pub struct TestQueue {
    pub queue: Arc<RetryQueue>,
    pub store: Arc<MemoryRecordStore>,
    pub handler: Arc<ScriptedHandler>,
}

impl TestQueue {
    pub fn new(handler: ScriptedHandler, options: QueueOptions) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let handler = Arc::new(handler);
        let queue = RetryQueue::new(
            store.clone() as Arc<dyn RecordStore>,
            handler.clone() as Arc<dyn QueueHandler>,
            options,
        )
        .expect("valid queue options");

        Self {
            queue: Arc::new(queue),
            store,
            handler,
        }
    }

    pub async fn get(&self, id: Uuid) -> QueueRecord {
        self.store
            .find_by_id(id)
            .await
            .unwrap()
            .expect("record exists")
    }

    /// Enqueue a record and then overwrite its lifecycle fields.
    pub async fn seed(
        &self,
        data: Value,
        status: RecordStatus,
        received_date: DateTime<Utc>,
        available: Option<DateTime<Utc>>,
    ) -> QueueRecord {
        let mut record = self.queue.enqueue(data).await.unwrap();
        record.status = status;
        record.received_date = received_date;
        record.available = available;
        assert!(self.store.replace(record.clone()).await);
        record
    }

    pub async fn update(&self, record: QueueRecord) {
        assert!(self.store.replace(record).await);
    }
}
