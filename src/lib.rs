pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod queue;
pub mod routes;
pub mod state;
pub mod worker;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::queue::{JobStore, WebhookQueue};
use crate::state::{AppState, SharedState};

/// Queue over `store` with the built-in handlers and the configured limits.
pub fn build_queue(store: Arc<dyn JobStore>, config: &Config) -> Arc<WebhookQueue> {
    let handlers = HandlerRegistry::with_defaults();
    tracing::info!("Webhook handlers registered: {}", handlers.types().join(", "));

    Arc::new(WebhookQueue::new(store, handlers, config.queue_settings()))
}

pub fn build_app(queue: Arc<WebhookQueue>, config: Config) -> (Router, SharedState) {
    if config.admin_token.is_none() {
        tracing::warn!("WEBHOOK_QUEUE_ADMIN_TOKEN not set, admin job API is unauthenticated");
    }

    let max_body_size = config.max_body_size;
    let state: SharedState = Arc::new(AppState { queue, config });

    let app = Router::new()
        .merge(routes::api_routes())
        .merge(routes::ingest_routes(max_body_size))
        .route("/health", axum::routing::get(health))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
