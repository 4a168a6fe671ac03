pub mod a2e;
pub mod stripe;
pub mod youtube;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError {
    pub message: String,
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError { message: s }
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError {
            message: s.to_string(),
        }
    }
}

/// Domain-side effect for one webhook source.
///
/// Implementations must be idempotent: the queue delivers at least once, and a
/// returned error sends the job down the retry path.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    fn webhook_type(&self) -> &str;
    async fn handle(&self, payload: &Value) -> Result<(), HandlerError>;
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the built-in `stripe`, `youtube` and `a2e` handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(stripe::StripeHandler));
        registry.register(Arc::new(youtube::YouTubeHandler));
        registry.register(Arc::new(a2e::A2eHandler));
        registry
    }

    /// Registers a handler, replacing any existing one for the same type.
    pub fn register(&mut self, handler: Arc<dyn WebhookHandler>) {
        self.handlers
            .insert(handler.webhook_type().to_string(), handler);
    }

    pub fn get(&self, webhook_type: &str) -> Option<&Arc<dyn WebhookHandler>> {
        self.handlers.get(webhook_type)
    }

    pub fn contains(&self, webhook_type: &str) -> bool {
        self.handlers.contains_key(webhook_type)
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

fn require_object<'a>(payload: &'a Value, source: &str) -> Result<&'a Map<String, Value>, HandlerError> {
    payload
        .as_object()
        .ok_or_else(|| HandlerError::from(format!("{source} payload must be a JSON object")))
}

fn str_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}
