use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus, StatusCount};

use super::{Filter, FindOptions, NewRecord, RecordPatch, RecordStore, SortField};

/// In-process record store. Records keep insertion order.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<QueueRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record.
    pub async fn all(&self) -> Vec<QueueRecord> {
        self.records.lock().await.clone()
    }

    /// Overwrite a stored record wholesale. Returns false if the id is unknown.
    pub async fn replace(&self, record: QueueRecord) -> bool {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<QueueRecord, QueueError> {
        let stored = QueueRecord {
            id: Uuid::now_v7(),
            status: record.status,
            received_date: record.received_date,
            available: Some(record.available),
            processed_date: None,
            retry_count: 0,
            failure_reason: None,
            immediate_failure: false,
            additional_info: None,
            notify_failure_reason: None,
            reset_date: None,
            data: record.data,
        };
        self.records.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn find(
        &self,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<QueueRecord>, QueueError> {
        let mut found: Vec<QueueRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        if let Some(SortField::ReceivedDate) = options.sort {
            // stable, so ties keep insertion order
            found.sort_by_key(|r| r.received_date);
        }
        if let Some(limit) = options.limit {
            found.truncate(limit.max(0) as usize);
        }
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueRecord>, QueueError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn update_one(&self, id: Uuid, patch: &RecordPatch) -> Result<u64, QueueError> {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                patch.apply(record);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_many(&self, ids: &[Uuid], patch: &RecordPatch) -> Result<u64, QueueError> {
        let mut records = self.records.lock().await;
        let mut matched = 0;
        for record in records.iter_mut().filter(|r| ids.contains(&r.id)) {
            patch.apply(record);
            matched += 1;
        }
        Ok(matched)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64, QueueError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        Ok((before - records.len()) as u64)
    }

    async fn count_by_status(&self) -> Result<Vec<StatusCount>, QueueError> {
        let records = self.records.lock().await;
        let mut counts: HashMap<RecordStatus, i64> = HashMap::new();
        for record in records.iter() {
            *counts.entry(record.status).or_default() += 1;
        }

        Ok(RecordStatus::ALL
            .into_iter()
            .filter_map(|status| {
                counts
                    .get(&status)
                    .map(|&count| StatusCount { status, count })
            })
            .collect())
    }

    async fn ensure_indexes(&self) {}
}
