//! In-memory [`JobQueue`] implementation.
//!
//! Implements the exact contract of the Postgres store over a mutexed
//! map, so every lease/retry/cancellation scenario can run in tests
//! and single-process demos without a database. The mutex makes each
//! operation atomic, mirroring the conditional-update guarantees of
//! the durable store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use genflow_core::{FailureKind, GenerationPayload, JobFailure, JobId, Timestamp};
use tokio::sync::Mutex;

use crate::record::{JobFilter, JobRecord, JobStatus, OwnerToken, QueueStats};
use crate::{JobQueue, QueueConfig, QueueError};

/// In-memory job store guarded by a single async mutex.
pub struct MemoryJobQueue {
    config: QueueConfig,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryJobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

fn lease_expiry(now: Timestamp, lease: Duration) -> Timestamp {
    now + chrono::Duration::milliseconds(lease.as_millis() as i64)
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, payload: GenerationPayload) -> Result<JobRecord, QueueError> {
        payload.validate()?;

        let now = Utc::now();
        let record = JobRecord {
            id: uuid::Uuid::now_v7(),
            status: JobStatus::Pending,
            payload,
            attempts: 0,
            progress: 0,
            result_ref: None,
            error: None,
            provider_job_id: None,
            owner_token: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };

        let mut jobs = self.jobs.lock().await;
        jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn dequeue(&self, lease: Duration) -> Result<Option<JobRecord>, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;

        // Oldest eligible job first; an expired-lease running job keeps
        // its original (older) position, so stalled work wins over
        // strictly newer pending jobs.
        let candidate = jobs
            .values()
            .filter(|job| job.eligible(now))
            .min_by_key(|job| (job.created_at, job.id))
            .map(|job| job.id);

        let Some(job) = candidate.and_then(|id| jobs.get_mut(&id)) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.owner_token = Some(uuid::Uuid::new_v4());
        job.lease_expires_at = Some(lease_expiry(now, lease));
        job.attempts += 1;
        job.progress = 0;
        job.started_at.get_or_insert(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn heartbeat(
        &self,
        id: JobId,
        owner: OwnerToken,
        lease: Duration,
        progress: Option<i16>,
    ) -> Result<bool, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running || job.owner_token != Some(owner) {
            return Ok(false);
        }
        job.lease_expires_at = Some(lease_expiry(now, lease));
        if let Some(progress) = progress {
            job.progress = progress.clamp(0, 100);
        }
        job.updated_at = now;
        Ok(true)
    }

    async fn set_provider_job(
        &self,
        id: JobId,
        owner: OwnerToken,
        provider_job_id: &str,
    ) -> Result<bool, QueueError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running || job.owner_token != Some(owner) {
            return Ok(false);
        }
        job.provider_job_id = Some(provider_job_id.to_string());
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete(
        &self,
        id: JobId,
        owner: OwnerToken,
        result_ref: &str,
    ) -> Result<bool, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running || job.owner_token != Some(owner) {
            return Ok(false);
        }
        job.status = JobStatus::Succeeded;
        job.result_ref = Some(result_ref.to_string());
        job.progress = 100;
        job.owner_token = None;
        job.lease_expires_at = None;
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn fail(
        &self,
        id: JobId,
        owner: OwnerToken,
        failure: JobFailure,
    ) -> Result<bool, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running || job.owner_token != Some(owner) {
            return Ok(false);
        }

        if failure.kind.is_retryable() && job.attempts < self.config.max_attempts {
            job.status = JobStatus::Pending;
            job.owner_token = None;
            job.lease_expires_at = None;
            job.provider_job_id = None;
            job.progress = 0;
        } else {
            job.status = JobStatus::Failed;
            job.error = Some(failure);
            job.owner_token = None;
            job.lease_expires_at = None;
            job.finished_at = Some(now);
        }
        job.updated_at = now;
        Ok(true)
    }

    async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        job.owner_token = None;
        job.lease_expires_at = None;
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, QueueError> {
        let (limit, offset) = filter.limit_offset();
        let jobs = self.jobs.lock().await;

        let mut matched: Vec<JobRecord> = jobs
            .values()
            .filter(|job| filter.status.is_none_or(|status| job.status == status))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let now = Utc::now();
        let jobs = self.jobs.lock().await;

        let mut stats = QueueStats::default();
        for job in jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => {
                    stats.running += 1;
                    if !job.lease_expired(now) {
                        stats.leased += 1;
                    }
                }
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn expire_overdue(&self) -> Result<u64, QueueError> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::milliseconds(self.config.job_deadline.as_millis() as i64);
        let mut jobs = self.jobs.lock().await;

        let mut expired = 0;
        for job in jobs.values_mut() {
            if !job.status.is_terminal() && job.created_at <= cutoff {
                job.status = JobStatus::Failed;
                job.error = Some(JobFailure::new(
                    FailureKind::DeadlineExceeded,
                    format!(
                        "Job exceeded the {}s wall-clock deadline",
                        self.config.job_deadline.as_secs()
                    ),
                ));
                job.owner_token = None;
                job.lease_expires_at = None;
                job.finished_at = Some(now);
                job.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn purge_terminal(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(older_than.as_millis() as i64);
        let mut jobs = self.jobs.lock().await;

        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.finished_at.is_some_and(|at| at <= cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }
}
