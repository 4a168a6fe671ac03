//! In-memory job store, used by tests and single-process embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{JobStore, StoreError};
use crate::models::{JobStatus, QueueStats, WebhookJob};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, WebhookJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs matching `status`, oldest first.
    async fn sorted(&self, status: Option<JobStatus>) -> Vec<WebhookJob> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<WebhookJob> = jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matching
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(
        &self,
        webhook_type: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<WebhookJob, StoreError> {
        let job = WebhookJob {
            id: Uuid::now_v7(),
            webhook_type: webhook_type.to_string(),
            payload: payload.clone(),
            status: JobStatus::Pending,
            retry_count: 0,
            last_error: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };

        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookJob>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<WebhookJob>, StoreError> {
        let mut pending = self.sorted(Some(JobStatus::Pending)).await;
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<WebhookJob>, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Completed;
                job.processed_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failure(
        &self,
        id: Uuid,
        status: JobStatus,
        retry_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = status;
                job.retry_count = retry_count;
                job.last_error = Some(error.to_string());
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_failed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookJob>, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Failed => {
                job.status = JobStatus::Pending;
                job.retry_count = 0;
                job.last_error = None;
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn requeue_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_retries: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let mut moved = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Processing && job.updated_at < stale_before {
                job.retry_count += 1;
                job.status = if job.retry_count >= max_retries {
                    JobStatus::Failed
                } else {
                    JobStatus::Pending
                };
                job.last_error = Some(error.to_string());
                job.updated_at = now;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status == JobStatus::Completed && job.processed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        let jobs = self.jobs.read().await;
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            stats.add(job.status, 1);
        }
        Ok(stats)
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookJob>, StoreError> {
        Ok(self
            .sorted(status)
            .await
            .into_iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .count() as i64)
    }
}
