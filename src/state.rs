use std::sync::Arc;

use crate::config::Config;
use crate::queue::WebhookQueue;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub queue: Arc<WebhookQueue>,
    pub config: Config,
}
