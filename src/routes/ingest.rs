use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::SharedState;

/// Accept a webhook delivery and queue it. Only a durable write is acknowledged;
/// anything else gets a non-2xx so the sender redelivers.
pub async fn receive(
    State(state): State<SharedState>,
    Path(webhook_type): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !state.queue.handlers().contains(&webhook_type) {
        return Err(AppError::NotFound(format!(
            "Unknown webhook type: {webhook_type}"
        )));
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?;

    let job_id = state.queue.enqueue(&webhook_type, &payload).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "queued",
            "job_id": job_id,
        })),
    ))
}
