use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{QueueRecord, RecordStatus, StatusCount};

use super::{Filter, FindOptions, NewRecord, RecordField, RecordPatch, RecordStore, SortField};

const INDEXED_COLUMNS: [&str; 4] = ["status", "available", "received_date", "processed_date"];

/// Postgres-backed record store; one table per collection.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    table: String,
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    status: String,
    received_date: DateTime<Utc>,
    available: Option<DateTime<Utc>>,
    processed_date: Option<DateTime<Utc>>,
    retry_count: i32,
    failure_reason: Option<serde_json::Value>,
    immediate_failure: bool,
    additional_info: Option<serde_json::Value>,
    notify_failure_reason: Option<serde_json::Value>,
    reset_date: Option<DateTime<Utc>>,
    data: serde_json::Value,
}

impl TryFrom<RecordRow> for QueueRecord {
    type Error = QueueError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(QueueRecord {
            id: row.id,
            status: row.status.parse().map_err(QueueError::Store)?,
            received_date: row.received_date,
            available: row.available,
            processed_date: row.processed_date,
            retry_count: row.retry_count,
            failure_reason: row.failure_reason,
            immediate_failure: row.immediate_failure,
            additional_info: row.additional_info,
            notify_failure_reason: row.notify_failure_reason,
            reset_date: row.reset_date,
            data: row.data,
        })
    }
}

impl PgRecordStore {
    /// `collection` must be a plain identifier; see `QueueOptions::validate`.
    pub fn new(pool: PgPool, collection: &str) -> Self {
        Self {
            pool,
            table: format!("\"{collection}\""),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the collection table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), QueueError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                 seq BIGSERIAL NOT NULL,
                 status TEXT NOT NULL,
                 received_date TIMESTAMPTZ NOT NULL DEFAULT now(),
                 available TIMESTAMPTZ,
                 processed_date TIMESTAMPTZ,
                 retry_count INTEGER NOT NULL DEFAULT 0,
                 failure_reason JSONB,
                 immediate_failure BOOLEAN NOT NULL DEFAULT FALSE,
                 additional_info JSONB,
                 notify_failure_reason JSONB,
                 reset_date TIMESTAMPTZ,
                 data JSONB NOT NULL
             )",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        // tables created before the insertion-order column existed
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS seq BIGSERIAL NOT NULL",
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn index_name(&self, column: &str) -> String {
        format!("\"{}_{column}_idx\"", self.table.trim_matches('"'))
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::StatusIn(statuses) => {
            let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            qb.push("status = ANY(");
            qb.push_bind(names);
            qb.push(")");
        }
        Filter::IdIn(ids) => {
            qb.push("id = ANY(");
            qb.push_bind(ids.clone());
            qb.push(")");
        }
        Filter::AvailableAtOrBefore(at) => {
            qb.push("available <= ");
            qb.push_bind(*at);
        }
        Filter::ProcessedAtOrBefore(at) => {
            qb.push("processed_date <= ");
            qb.push_bind(*at);
        }
        Filter::And(filters) => push_group(qb, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_group(qb, filters, " OR ", "FALSE"),
    }
}

fn push_group(qb: &mut QueryBuilder<'_, Postgres>, filters: &[Filter], joiner: &str, empty: &str) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_filter(qb, filter);
    }
    qb.push(")");
}

/// Ties on the sort key fall back to insertion order.
fn push_sort(qb: &mut QueryBuilder<'_, Postgres>, sort: SortField) {
    match sort {
        SortField::ReceivedDate => qb.push(" ORDER BY received_date ASC, seq ASC"),
    };
}

fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &RecordPatch) {
    let mut set = qb.separated(", ");

    if let Some(status) = patch.status {
        set.push("status = ");
        set.push_bind_unseparated(status.as_str().to_string());
    }
    if let Some(at) = patch.received_date {
        set.push("received_date = ");
        set.push_bind_unseparated(at);
    }
    if let Some(at) = patch.available {
        set.push("available = ");
        set.push_bind_unseparated(at);
    }
    if let Some(at) = patch.processed_date {
        set.push("processed_date = ");
        set.push_bind_unseparated(at);
    }
    if let Some(count) = patch.retry_count {
        set.push("retry_count = ");
        set.push_bind_unseparated(count);
    }
    if let Some(reason) = &patch.failure_reason {
        set.push("failure_reason = ");
        set.push_bind_unseparated(reason.clone());
    }
    if let Some(flag) = patch.immediate_failure {
        set.push("immediate_failure = ");
        set.push_bind_unseparated(flag);
    }
    if let Some(info) = &patch.additional_info {
        set.push("additional_info = ");
        set.push_bind_unseparated(info.clone());
    }
    if let Some(reason) = &patch.notify_failure_reason {
        set.push("notify_failure_reason = ");
        set.push_bind_unseparated(reason.clone());
    }
    if let Some(at) = patch.reset_date {
        set.push("reset_date = ");
        set.push_bind_unseparated(at);
    }

    for field in &patch.unset {
        set.push(match field {
            RecordField::Available => "available = NULL",
            RecordField::ProcessedDate => "processed_date = NULL",
            RecordField::RetryCount => "retry_count = 0",
            RecordField::FailureReason => "failure_reason = NULL",
            RecordField::ImmediateFailure => "immediate_failure = FALSE",
            RecordField::AdditionalInfo => "additional_info = NULL",
            RecordField::NotifyFailureReason => "notify_failure_reason = NULL",
            RecordField::ResetDate => "reset_date = NULL",
        });
    }

    if *patch == RecordPatch::default() {
        // an empty SET clause is invalid; keep the statement a no-op that still counts matches
        set.push("id = id");
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<QueueRecord, QueueError> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "INSERT INTO {} (status, received_date, available, data)
             VALUES ($1, $2, $3, $4) RETURNING *",
            self.table
        ))
        .bind(record.status.as_str())
        .bind(record.received_date)
        .bind(record.available)
        .bind(&record.data)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find(
        &self,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<QueueRecord>, QueueError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT * FROM {} WHERE ", self.table));
        push_filter(&mut qb, filter);

        if let Some(sort) = options.sort {
            push_sort(&mut qb, sort);
        }
        if let Some(limit) = options.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        qb.build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(QueueRecord::try_from)
            .collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueRecord>, QueueError> {
        sqlx::query_as::<_, RecordRow>(&format!("SELECT * FROM {} WHERE id = $1", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(QueueRecord::try_from)
            .transpose()
    }

    async fn update_one(&self, id: Uuid, patch: &RecordPatch) -> Result<u64, QueueError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", self.table));
        push_patch(&mut qb, patch);
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_many(&self, ids: &[Uuid], patch: &RecordPatch) -> Result<u64, QueueError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", self.table));
        push_patch(&mut qb, patch);
        qb.push(" WHERE id = ANY(");
        qb.push_bind(ids.to_vec());
        qb.push(")");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64, QueueError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("DELETE FROM {} WHERE ", self.table));
        push_filter(&mut qb, filter);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_by_status(&self) -> Result<Vec<StatusCount>, QueueError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut counts = rows
            .into_iter()
            .map(|(status, count)| {
                Ok(StatusCount {
                    status: status.parse::<RecordStatus>().map_err(QueueError::Store)?,
                    count,
                })
            })
            .collect::<Result<Vec<_>, QueueError>>()?;
        counts.sort_by_key(|c| RecordStatus::ALL.iter().position(|s| *s == c.status));
        Ok(counts)
    }

    async fn ensure_indexes(&self) {
        for column in INDEXED_COLUMNS {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({column})",
                self.index_name(column),
                self.table
            );
            if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                tracing::warn!("Failed to create index on {}.{column}: {e}", self.table);
            }
        }
    }
}
