//! The worker loop: claim a job, drive it through the provider, and
//! record the outcome.
//!
//! The worker never trusts its own clock for ownership. Every
//! queue mutation is guarded by the owner token stamped at claim time;
//! a `false` return means the lease was lost and the local outcome is
//! discarded.

use std::sync::Arc;
use std::time::Duration;

use genflow_core::{keys::artifact_key, Backoff, FailureKind, JobFailure, TaskKind};
use genflow_provider::{classify_failure, InferenceProvider, PollResponse, ProviderStatus};
use genflow_queue::record::{JobRecord, JobStatus, OwnerToken};
use genflow_queue::JobQueue;
use genflow_storage::ObjectStore;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Progress after the provider accepts the submission.
const PROGRESS_SUBMITTED: i16 = 10;
/// Progress floor while the provider is generating.
const PROGRESS_GENERATING_FLOOR: i16 = 25;
/// Progress ceiling for provider-reported generation progress.
const PROGRESS_GENERATING_CEIL: i16 = 90;
/// Progress after the artifact has been fetched, before upload.
const PROGRESS_FETCHED: i16 = 95;

/// Outcome of driving a single claimed job.
enum JobOutcome {
    /// Terminal state recorded on the queue.
    Recorded,
    /// The lease was lost mid-flight; nothing was recorded.
    LeaseLost,
    /// The job was cancelled while in flight.
    Cancelled,
    /// Shutdown was requested; the job is left to lease expiry.
    Shutdown,
}

/// A single-job-at-a-time generation worker.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    provider: Arc<dyn InferenceProvider>,
    store: Arc<dyn ObjectStore>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        provider: Arc<dyn InferenceProvider>,
        store: Arc<dyn ObjectStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            provider,
            store,
            config,
        }
    }

    /// Run until `cancel` is triggered.
    ///
    /// Claims and processes jobs one at a time, backing off while the
    /// queue is empty, and runs the deadline/retention sweeps on a
    /// fixed interval.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            lease_secs = self.config.lease.as_secs(),
            sweep_secs = self.config.sweep_interval.as_secs(),
            "worker started"
        );

        let mut idle = Backoff::new(self.config.idle_backoff.clone());
        let mut last_sweep = tokio::time::Instant::now();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if last_sweep.elapsed() >= self.config.sweep_interval {
                self.run_sweeps().await;
                last_sweep = tokio::time::Instant::now();
            }

            match self.run_once(&cancel).await {
                Ok(true) => idle.reset(),
                Ok(false) => {
                    let delay = idle.delay();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "queue unavailable, backing off");
                    let delay = idle.delay();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("worker stopped");
    }

    /// Claim and process at most one job. Returns whether a job was
    /// claimed.
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<bool, genflow_queue::QueueError> {
        let Some(job) = self.queue.dequeue(self.config.lease).await? else {
            return Ok(false);
        };

        let job_id = job.id;
        let attempt = job.attempts;
        tracing::info!(%job_id, attempt, task = job.payload.kind().as_str(), "job claimed");

        match self.process_job(job, cancel).await {
            JobOutcome::Recorded => {}
            JobOutcome::LeaseLost => {
                tracing::warn!(%job_id, attempt, "lease lost, abandoning job");
            }
            JobOutcome::Cancelled => {
                tracing::info!(%job_id, attempt, "job cancelled while in flight");
            }
            JobOutcome::Shutdown => {
                tracing::info!(%job_id, attempt, "shutdown requested, releasing job to lease expiry");
            }
        }
        Ok(true)
    }

    /// Expire jobs past their wall-clock deadline and purge old
    /// terminal jobs.
    async fn run_sweeps(&self) {
        match self.queue.expire_overdue().await {
            Ok(expired) if expired > 0 => {
                tracing::warn!(expired, "deadline sweep: jobs forced to failed");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "deadline sweep failed"),
        }

        match self.queue.purge_terminal(self.config.retention).await {
            Ok(purged) if purged > 0 => {
                tracing::info!(purged, "retention sweep: purged terminal jobs");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "retention sweep failed"),
        }
    }

    async fn process_job(&self, job: JobRecord, cancel: &CancellationToken) -> JobOutcome {
        let Some(owner) = job.owner_token else {
            tracing::error!(job_id = %job.id, "claimed job carries no owner token");
            return JobOutcome::LeaseLost;
        };

        // One idempotency key per (job, attempt): a reclaimed job is a
        // fresh attempt and must be a fresh provider submission.
        let idempotency_key = format!("{}:{}", job.id, job.attempts);

        let provider_job_id = match self.provider.submit(&job.payload, &idempotency_key).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "submission failed");
                return self
                    .record_failure(&job, owner, JobFailure::new(err.failure_kind(), err.to_string()))
                    .await;
            }
        };

        if !self
            .discard_on_queue_error(
                self.queue
                    .set_provider_job(job.id, owner, &provider_job_id)
                    .await,
            )
        {
            self.cancel_provider(&provider_job_id).await;
            return JobOutcome::LeaseLost;
        }

        if !self.discard_on_queue_error(
            self.queue
                .heartbeat(job.id, owner, self.config.lease, Some(PROGRESS_SUBMITTED))
                .await,
        ) {
            return self.abandon_in_flight(&job, &provider_job_id).await;
        }

        self.await_provider(&job, owner, &provider_job_id, cancel)
            .await
    }

    /// Poll the provider until the job reaches a terminal state, the
    /// wait budget runs out, the lease is lost, or shutdown begins.
    async fn await_provider(
        &self,
        job: &JobRecord,
        owner: OwnerToken,
        provider_job_id: &str,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let kind = job.payload.kind();
        let poll_interval = self.config.poll_interval(kind);
        let deadline = tokio::time::Instant::now() + self.config.provider_wait(kind);

        loop {
            if tokio::time::Instant::now() >= deadline {
                self.cancel_provider(provider_job_id).await;
                let failure = JobFailure::new(
                    FailureKind::TransientProvider,
                    format!(
                        "provider did not finish within {}s",
                        self.config.provider_wait(kind).as_secs()
                    ),
                );
                return self.record_failure(job, owner, failure).await;
            }

            let observation = match self.provider.poll(provider_job_id).await {
                Ok(observation) => observation,
                Err(err) => {
                    tracing::warn!(job_id = %job.id, error = %err, "provider poll failed");
                    self.cancel_provider(provider_job_id).await;
                    return self
                        .record_failure(
                            job,
                            owner,
                            JobFailure::new(err.failure_kind(), err.to_string()),
                        )
                        .await;
                }
            };

            let progress = progress_for(&observation);
            if !self.discard_on_queue_error(
                self.queue
                    .heartbeat(job.id, owner, self.config.lease, progress)
                    .await,
            ) {
                return self.abandon_in_flight(job, provider_job_id).await;
            }

            match observation.status {
                ProviderStatus::Queued | ProviderStatus::Running => {}
                ProviderStatus::Completed => {
                    return self
                        .finish_job(job, owner, provider_job_id, kind)
                        .await;
                }
                ProviderStatus::Failed => {
                    let message = observation
                        .error
                        .unwrap_or_else(|| "provider reported failure".to_string());
                    let kind = classify_failure(&message);
                    return self
                        .record_failure(job, owner, JobFailure::new(kind, message))
                        .await;
                }
                ProviderStatus::Cancelled | ProviderStatus::TimedOut => {
                    let failure = JobFailure::new(
                        FailureKind::TransientProvider,
                        format!("provider ended the job in state {:?}", observation.status),
                    );
                    return self.record_failure(job, owner, failure).await;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return JobOutcome::Shutdown,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Fetch the artifact, persist it, and mark the job succeeded.
    async fn finish_job(
        &self,
        job: &JobRecord,
        owner: OwnerToken,
        provider_job_id: &str,
        kind: TaskKind,
    ) -> JobOutcome {
        let artifact = match self.provider.fetch(provider_job_id).await {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "artifact fetch failed");
                return self
                    .record_failure(job, owner, JobFailure::new(err.failure_kind(), err.to_string()))
                    .await;
            }
        };

        if !self.discard_on_queue_error(
            self.queue
                .heartbeat(job.id, owner, self.config.lease, Some(PROGRESS_FETCHED))
                .await,
        ) {
            return JobOutcome::LeaseLost;
        }

        let key = artifact_key(job.id, 0, kind.artifact_ext());
        let result_ref = match self
            .store
            .put(&key, artifact.bytes, &artifact.content_type)
            .await
        {
            Ok(result_ref) => result_ref,
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "artifact upload failed");
                return self
                    .record_failure(
                        job,
                        owner,
                        JobFailure::new(FailureKind::TransientInfra, err.to_string()),
                    )
                    .await;
            }
        };

        match self.queue.complete(job.id, owner, &result_ref).await {
            Ok(true) => {
                tracing::info!(job_id = %job.id, result_ref, "job succeeded");
                JobOutcome::Recorded
            }
            Ok(false) => {
                tracing::warn!(job_id = %job.id, "completion discarded, lease was lost");
                JobOutcome::LeaseLost
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %err, "failed to record completion");
                JobOutcome::LeaseLost
            }
        }
    }

    /// Record a failure; the queue decides between retry and terminal.
    async fn record_failure(
        &self,
        job: &JobRecord,
        owner: OwnerToken,
        failure: JobFailure,
    ) -> JobOutcome {
        tracing::warn!(
            job_id = %job.id,
            kind = ?failure.kind,
            message = %failure.message,
            "recording job failure"
        );
        match self.queue.fail(job.id, owner, failure).await {
            Ok(true) => JobOutcome::Recorded,
            Ok(false) => {
                tracing::warn!(job_id = %job.id, "failure discarded, lease was lost");
                JobOutcome::LeaseLost
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %err, "failed to record failure");
                JobOutcome::LeaseLost
            }
        }
    }

    /// Distinguish cancellation from lease theft after a guarded
    /// mutation returned `false`. A cancelled job gets a best-effort
    /// provider cancellation; a stolen one is left to its new owner.
    async fn abandon_in_flight(&self, job: &JobRecord, provider_job_id: &str) -> JobOutcome {
        match self.queue.get(job.id).await {
            Ok(Some(current)) if current.status == JobStatus::Cancelled => {
                self.cancel_provider(provider_job_id).await;
                JobOutcome::Cancelled
            }
            _ => JobOutcome::LeaseLost,
        }
    }

    async fn cancel_provider(&self, provider_job_id: &str) {
        if let Err(err) = self.provider.cancel(provider_job_id).await {
            tracing::warn!(provider_job_id, error = %err, "provider cancellation failed");
        }
    }

    /// Collapse a guarded mutation's result into "still own the job".
    fn discard_on_queue_error(&self, result: Result<bool, genflow_queue::QueueError>) -> bool {
        match result {
            Ok(owned) => owned,
            Err(err) => {
                tracing::error!(error = %err, "queue mutation failed");
                false
            }
        }
    }
}

/// Map a provider observation onto the job's progress scale.
fn progress_for(observation: &PollResponse) -> Option<i16> {
    match observation.status {
        ProviderStatus::Queued => Some(PROGRESS_SUBMITTED),
        ProviderStatus::Running => {
            let span = (PROGRESS_GENERATING_CEIL - PROGRESS_GENERATING_FLOOR) as i32;
            let provider = observation.progress.unwrap_or(0).clamp(0, 100) as i32;
            Some((PROGRESS_GENERATING_FLOOR as i32 + provider * span / 100) as i16)
        }
        _ => None,
    }
}
