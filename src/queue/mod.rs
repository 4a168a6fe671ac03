pub mod clock;
pub mod memory;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::handlers::HandlerRegistry;
use crate::models::{JobStatus, QueueStats, WebhookJob};

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryJobStore;
pub use store::{JobStore, PgJobStore, StoreError};

#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Pending jobs loaded per `process_pending` call.
    pub batch_size: i64,
    /// Total attempts before a job is marked failed.
    pub max_retries: i32,
    pub handler_timeout: Duration,
    /// A job still `processing` this long after its claim was abandoned by a
    /// crashed processor and is counted as a failed attempt.
    pub stale_after: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: 3,
            handler_timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub enum QueueError {
    InvalidType(String),
    InvalidRetention(u32),
    NotFound(Uuid),
    InvalidState { id: Uuid, status: JobStatus },
    Store(StoreError),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::InvalidType(msg) => write!(f, "Invalid webhook type: {msg}"),
            QueueError::InvalidRetention(days) => {
                write!(f, "Retention of {days} days is out of range")
            }
            QueueError::NotFound(id) => write!(f, "Webhook job {id} not found"),
            QueueError::InvalidState { id, status } => {
                write!(f, "Webhook job {id} is {status}, expected failed")
            }
            QueueError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        QueueError::Store(err)
    }
}

enum DispatchError {
    /// No handler registered; retrying cannot help.
    Unrecognized(String),
    Failed(String),
}

/// Durable webhook queue: persists inbound payloads and drives them through
/// `pending -> processing -> completed | pending (retry) | failed`.
pub struct WebhookQueue {
    store: Arc<dyn JobStore>,
    handlers: HandlerRegistry,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
}

impl WebhookQueue {
    pub fn new(store: Arc<dyn JobStore>, handlers: HandlerRegistry, settings: QueueSettings) -> Self {
        Self {
            store,
            handlers,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Persist a new pending job. Store failures are returned to the caller so
    /// the webhook sender gets a non-2xx and redelivers.
    pub async fn enqueue(&self, webhook_type: &str, payload: &Value) -> Result<Uuid, QueueError> {
        if webhook_type.trim().is_empty() {
            return Err(QueueError::InvalidType(
                "webhook type must not be empty".to_string(),
            ));
        }

        let job = self
            .store
            .insert(webhook_type, payload, self.clock.now())
            .await?;

        tracing::info!(job_id = %job.id, webhook_type, "Webhook job enqueued");
        Ok(job.id)
    }

    /// Process one batch of pending jobs, one after another. Never fails: store
    /// and handler errors are logged. Returns how many jobs reached a new state.
    pub async fn process_pending(&self) -> usize {
        self.recover_stale().await;

        let jobs = match self.store.list_pending(self.settings.batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("Failed to load pending webhook jobs: {e}");
                return 0;
            }
        };

        if jobs.is_empty() {
            return 0;
        }

        tracing::debug!("Processing {} pending webhook jobs", jobs.len());

        let mut processed = 0;
        for job in jobs {
            if self.process_job(job).await.is_some() {
                processed += 1;
            }
        }
        processed
    }

    /// Return jobs abandoned in `processing` to the retry path, charging the
    /// interrupted attempt against their retry budget.
    async fn recover_stale(&self) {
        let now = self.clock.now();
        let Some(stale_before) = chrono::TimeDelta::from_std(self.settings.stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return;
        };

        match self
            .store
            .requeue_stale(
                stale_before,
                self.settings.max_retries,
                "Processing interrupted before an outcome was recorded",
                now,
            )
            .await
        {
            Ok(0) => {}
            Ok(recovered) => {
                tracing::warn!(recovered, "Recovered webhook jobs stuck in processing");
            }
            Err(e) => tracing::error!("Failed to recover stale webhook jobs: {e}"),
        }
    }

    /// Claim, dispatch and record the outcome of a single job. Returns the state
    /// the job ended in, or None if it was claimed elsewhere or a write failed.
    async fn process_job(&self, job: WebhookJob) -> Option<JobStatus> {
        let job = match self.store.claim(job.id, self.clock.now()).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!(job_id = %job.id, "Webhook job already claimed, skipping");
                return None;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, "Failed to claim webhook job: {e}");
                return None;
            }
        };

        tracing::debug!(
            job_id = %job.id,
            webhook_type = %job.webhook_type,
            attempt = job.retry_count + 1,
            "Dispatching webhook job"
        );

        match self.dispatch(&job).await {
            Ok(()) => match self.store.mark_completed(job.id, self.clock.now()).await {
                Ok(true) => {
                    tracing::info!(job_id = %job.id, webhook_type = %job.webhook_type, "Webhook job completed");
                    Some(JobStatus::Completed)
                }
                Ok(false) => {
                    tracing::warn!(job_id = %job.id, "Webhook job left processing before completion was recorded");
                    None
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, "Failed to mark webhook job completed: {e}");
                    None
                }
            },
            Err(DispatchError::Unrecognized(message)) => {
                self.record_failure(&job, JobStatus::Failed, job.retry_count + 1, &message)
                    .await
            }
            Err(DispatchError::Failed(message)) => {
                self.handle_processing_error(&job, &message).await
            }
        }
    }

    async fn dispatch(&self, job: &WebhookJob) -> Result<(), DispatchError> {
        let Some(handler) = self.handlers.get(&job.webhook_type) else {
            return Err(DispatchError::Unrecognized(format!(
                "Unrecognized webhook type: {}",
                job.webhook_type
            )));
        };

        // A panicking handler surfaces as a JoinError instead of unwinding the processor.
        let handler = handler.clone();
        let payload = job.payload.clone();
        let mut task = tokio::spawn(async move { handler.handle(&payload).await });

        match tokio::time::timeout(self.settings.handler_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DispatchError::Failed(e.message)),
            Ok(Err(e)) => Err(DispatchError::Failed(format!("Handler panicked: {e}"))),
            Err(_) => {
                task.abort();
                Err(DispatchError::Failed(format!(
                    "Handler timed out after {}s",
                    self.settings.handler_timeout.as_secs()
                )))
            }
        }
    }

    /// Count the failed attempt and either re-queue the job or fail it for good.
    async fn handle_processing_error(&self, job: &WebhookJob, message: &str) -> Option<JobStatus> {
        let retry_count = job.retry_count + 1;
        let status = if retry_count >= self.settings.max_retries {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };

        self.record_failure(job, status, retry_count, message).await
    }

    async fn record_failure(
        &self,
        job: &WebhookJob,
        status: JobStatus,
        retry_count: i32,
        message: &str,
    ) -> Option<JobStatus> {
        match self
            .store
            .record_failure(job.id, status, retry_count, message, self.clock.now())
            .await
        {
            Ok(true) => {
                if status == JobStatus::Failed {
                    tracing::error!(
                        job_id = %job.id,
                        webhook_type = %job.webhook_type,
                        retry_count,
                        "Webhook job failed permanently: {message}"
                    );
                } else {
                    tracing::warn!(
                        job_id = %job.id,
                        webhook_type = %job.webhook_type,
                        retry_count,
                        max_retries = self.settings.max_retries,
                        "Webhook job failed, will retry: {message}"
                    );
                }
                Some(status)
            }
            Ok(false) => {
                tracing::warn!(job_id = %job.id, "Webhook job left processing before failure was recorded");
                None
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, "Failed to record webhook job failure: {e}");
                None
            }
        }
    }

    pub async fn get_status(&self, id: Uuid) -> Result<Option<WebhookJob>, QueueError> {
        Ok(self.store.find_by_id(id).await?)
    }

    /// Reset a failed job and process it right away, returning the row as it
    /// stands afterwards.
    pub async fn retry_failed(&self, id: Uuid) -> Result<WebhookJob, QueueError> {
        let job = match self.store.reset_failed(id, self.clock.now()).await? {
            Some(job) => job,
            None => {
                return Err(match self.store.find_by_id(id).await? {
                    Some(job) => QueueError::InvalidState {
                        id,
                        status: job.status,
                    },
                    None => QueueError::NotFound(id),
                });
            }
        };

        tracing::info!(job_id = %id, webhook_type = %job.webhook_type, "Manual retry of webhook job");
        self.process_job(job).await;

        self.store
            .find_by_id(id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    /// Delete completed jobs processed more than `older_than_days` ago.
    pub async fn cleanup(&self, older_than_days: u32) -> Result<u64, QueueError> {
        let cutoff = chrono::TimeDelta::try_days(i64::from(older_than_days))
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .ok_or(QueueError::InvalidRetention(older_than_days))?;
        let removed = self.store.delete_completed_before(cutoff).await?;

        if removed > 0 {
            tracing::info!(removed, older_than_days, "Cleaned up completed webhook jobs");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.store.stats().await?)
    }

    /// One page of jobs, newest first, with the total matching count.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookJob>, i64), QueueError> {
        let jobs = self.store.list(status, limit, offset).await?;
        let total = self.store.count(status).await?;
        Ok((jobs, total))
    }
}
