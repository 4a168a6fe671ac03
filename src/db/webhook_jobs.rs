use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{JobStatus, WebhookJob};

pub async fn create(
    pool: &PgPool,
    id: Uuid,
    webhook_type: &str,
    payload: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<WebhookJob, sqlx::Error> {
    sqlx::query_as::<_, WebhookJob>(
        "INSERT INTO webhook_jobs (id, webhook_type, payload, status, retry_count, created_at, updated_at)
         VALUES ($1, $2, $3, 'pending', 0, $4, $4) RETURNING *",
    )
    .bind(id)
    .bind(webhook_type)
    .bind(payload)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<WebhookJob>, sqlx::Error> {
    sqlx::query_as::<_, WebhookJob>("SELECT * FROM webhook_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<WebhookJob>, sqlx::Error> {
    sqlx::query_as::<_, WebhookJob>(
        "SELECT * FROM webhook_jobs WHERE status = 'pending'
         ORDER BY created_at ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Move a pending job to processing. Returns None when another processor got there first.
pub async fn claim(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<WebhookJob>, sqlx::Error> {
    sqlx::query_as::<_, WebhookJob>(
        "UPDATE webhook_jobs SET status = 'processing', updated_at = $2
         WHERE id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn mark_completed(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE webhook_jobs
         SET status = 'completed', processed_at = $2, updated_at = $2
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn record_failure(
    pool: &PgPool,
    id: Uuid,
    status: JobStatus,
    retry_count: i32,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE webhook_jobs
         SET status = $2, retry_count = $3, last_error = $4, updated_at = $5
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(retry_count)
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn reset_failed(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<WebhookJob>, sqlx::Error> {
    sqlx::query_as::<_, WebhookJob>(
        "UPDATE webhook_jobs
         SET status = 'pending', retry_count = 0, last_error = NULL, updated_at = $2
         WHERE id = $1 AND status = 'failed'
         RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Jobs whose claim is older than `stale_before` were abandoned mid-dispatch.
pub async fn requeue_stale(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
    max_retries: i32,
    error: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE webhook_jobs
         SET status = CASE WHEN retry_count + 1 >= $2 THEN 'failed' ELSE 'pending' END,
             retry_count = retry_count + 1,
             last_error = $3,
             updated_at = $4
         WHERE status = 'processing' AND updated_at < $1",
    )
    .bind(stale_before)
    .bind(max_retries)
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_completed_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM webhook_jobs WHERE status = 'completed' AND processed_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM webhook_jobs GROUP BY status",
    )
    .fetch_all(pool)
    .await
}

pub async fn list(
    pool: &PgPool,
    status: Option<JobStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<WebhookJob>, sqlx::Error> {
    sqlx::query_as::<_, WebhookJob>(
        "SELECT * FROM webhook_jobs
         WHERE ($1::text IS NULL OR status = $1)
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &PgPool, status: Option<JobStatus>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM webhook_jobs WHERE ($1::text IS NULL OR status = $1)",
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_one(pool)
    .await
}
