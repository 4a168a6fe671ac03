use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AdminAuth;
use crate::error::AppError;
use crate::models::{JobStatus, QueueStats, WebhookJob};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Deserialize)]
pub struct CleanupRequest {
    pub older_than_days: Option<u32>,
}

pub async fn list(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::BadRequest("page is out of range".to_string()))?;

    let (jobs, total) = state.queue.list(status, per_page, offset).await?;

    Ok(Json(json!({
        "jobs": jobs,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

pub async fn stats(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<QueueStats>, AppError> {
    Ok(Json(state.queue.stats().await?))
}

pub async fn get(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookJob>, AppError> {
    let job = state
        .queue
        .get_status(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Webhook job not found".to_string()))?;
    Ok(Json(job))
}

pub async fn retry(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookJob>, AppError> {
    Ok(Json(state.queue.retry_failed(id).await?))
}

pub async fn cleanup(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let older_than_days = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<CleanupRequest>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
            .older_than_days
    }
    .unwrap_or(state.config.retention_days);

    let removed = state.queue.cleanup(older_than_days).await?;

    Ok(Json(json!({
        "removed": removed,
        "older_than_days": older_than_days,
    })))
}
