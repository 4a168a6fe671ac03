use async_trait::async_trait;
use serde_json::Value;

use super::{HandlerError, WebhookHandler, require_object, str_field};

/// Publish-status notifications for uploaded videos.
pub struct YouTubeHandler;

#[async_trait]
impl WebhookHandler for YouTubeHandler {
    fn webhook_type(&self) -> &str {
        "youtube"
    }

    async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
        let notification = require_object(payload, "YouTube")?;
        let video_id = str_field(notification, &["videoId", "video_id"]).unwrap_or("-");
        let channel_id = str_field(notification, &["channelId", "channel_id"]).unwrap_or("-");

        tracing::info!(video_id, channel_id, "YouTube notification received");
        Ok(())
    }
}
