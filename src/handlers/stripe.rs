use async_trait::async_trait;
use serde_json::Value;

use super::{HandlerError, WebhookHandler, require_object, str_field};

/// Subscription lifecycle events that change a user's tier.
const SUBSCRIPTION_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
    "invoice.paid",
    "invoice.payment_failed",
];

pub struct StripeHandler;

#[async_trait]
impl WebhookHandler for StripeHandler {
    fn webhook_type(&self) -> &str {
        "stripe"
    }

    async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
        let event = require_object(payload, "Stripe")?;
        let event_type = str_field(event, &["type"])
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HandlerError::from("Stripe event is missing 'type'"))?;
        let event_id = str_field(event, &["id"]).unwrap_or("-");

        if SUBSCRIPTION_EVENTS.contains(&event_type) {
            tracing::info!(event_id, event_type, "Stripe subscription event received");
        } else {
            tracing::debug!(event_id, event_type, "Ignoring Stripe event");
        }

        Ok(())
    }
}
