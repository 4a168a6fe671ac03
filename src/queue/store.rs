use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{JobStatus, QueueStats, WebhookJob};

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Corrupt(String),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "Database error: {err}"),
            StoreError::Corrupt(msg) => write!(f, "Corrupt job row: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "Job store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Durable storage for webhook jobs.
///
/// Every status transition is a conditional write on the current status, so a
/// lost race shows up as `None`/`false` rather than a clobbered row.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(
        &self,
        webhook_type: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<WebhookJob, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookJob>, StoreError>;

    async fn list_pending(&self, limit: i64) -> Result<Vec<WebhookJob>, StoreError>;

    /// `pending -> processing`.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<WebhookJob>, StoreError>;

    /// `processing -> completed`, stamping `processed_at`.
    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// `processing -> pending | failed` with the new retry count and error.
    async fn record_failure(
        &self,
        id: Uuid,
        status: JobStatus,
        retry_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `failed -> pending`, clearing retry count and last error.
    async fn reset_failed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookJob>, StoreError>;

    /// `processing -> pending | failed` for jobs claimed before `stale_before`,
    /// counting the interrupted attempt. Returns how many rows moved.
    async fn requeue_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_retries: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<QueueStats, StoreError>;

    /// Newest first.
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookJob>, StoreError>;

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, StoreError>;
}

/// PostgreSQL-backed store over the `webhook_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(
        &self,
        webhook_type: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<WebhookJob, StoreError> {
        Ok(db::webhook_jobs::create(&self.pool, Uuid::now_v7(), webhook_type, payload, now).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookJob>, StoreError> {
        Ok(db::webhook_jobs::find_by_id(&self.pool, id).await?)
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<WebhookJob>, StoreError> {
        Ok(db::webhook_jobs::list_pending(&self.pool, limit).await?)
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<WebhookJob>, StoreError> {
        Ok(db::webhook_jobs::claim(&self.pool, id, now).await?)
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(db::webhook_jobs::mark_completed(&self.pool, id, now).await?)
    }

    async fn record_failure(
        &self,
        id: Uuid,
        status: JobStatus,
        retry_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(db::webhook_jobs::record_failure(&self.pool, id, status, retry_count, error, now).await?)
    }

    async fn reset_failed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookJob>, StoreError> {
        Ok(db::webhook_jobs::reset_failed(&self.pool, id, now).await?)
    }

    async fn requeue_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_retries: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(db::webhook_jobs::requeue_stale(&self.pool, stale_before, max_retries, error, now).await?)
    }

    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(db::webhook_jobs::delete_completed_before(&self.pool, cutoff).await?)
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        let rows = db::webhook_jobs::count_by_status(&self.pool).await?;
        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let status: JobStatus = status.parse().map_err(StoreError::Corrupt)?;
            stats.add(status, count);
        }
        Ok(stats)
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookJob>, StoreError> {
        Ok(db::webhook_jobs::list(&self.pool, status, limit, offset).await?)
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, StoreError> {
        Ok(db::webhook_jobs::count(&self.pool, status).await?)
    }
}
