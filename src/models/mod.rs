pub mod webhook_job;

pub use webhook_job::{JobStatus, QueueStats, WebhookJob};
