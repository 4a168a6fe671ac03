use async_trait::async_trait;
use serde_json::Value;

use super::{HandlerError, WebhookHandler, require_object, str_field};

/// Avatar and video render completion callbacks from A2E.
pub struct A2eHandler;

#[async_trait]
impl WebhookHandler for A2eHandler {
    fn webhook_type(&self) -> &str {
        "a2e"
    }

    async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
        let event = require_object(payload, "A2E")?;
        let task_id = str_field(event, &["task_id", "_id", "id"]).unwrap_or("-");
        let status = str_field(event, &["status", "current_status"]).unwrap_or("unknown");

        tracing::info!(task_id, status, "A2E render event received");
        Ok(())
    }
}
