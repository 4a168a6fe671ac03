pub mod ingest;
pub mod jobs;

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/jobs", get(jobs::list))
        .route("/api/v1/jobs/stats", get(jobs::stats))
        .route("/api/v1/jobs/cleanup", post(jobs::cleanup))
        .route("/api/v1/jobs/{id}", get(jobs::get))
        .route("/api/v1/jobs/{id}/retry", post(jobs::retry))
}

pub fn ingest_routes(max_body_size: usize) -> Router<SharedState> {
    Router::new()
        .route("/webhooks/{webhook_type}", post(ingest::receive))
        .layer(RequestBodyLimitLayer::new(max_body_size))
}
