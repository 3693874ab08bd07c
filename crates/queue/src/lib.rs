//! Durable job queue: multi-producer multi-consumer hand-off of
//! generation jobs with at-least-once delivery.
//!
//! The [`JobQueue`] trait is the complete coordination contract between
//! producers (the submission API) and workers. Every mutating
//! operation is a compare-and-write against `status` + `owner_token`,
//! so independent worker processes coordinate through the store alone —
//! no shared memory, no cross-process locks.
//!
//! Two implementations are provided: [`PgJobQueue`] (Postgres, the
//! production store) and [`MemoryJobQueue`] (tests and single-process
//! demos).

pub mod memory;
pub mod postgres;
pub mod record;

use std::time::Duration;

use async_trait::async_trait;
use genflow_core::{CoreError, GenerationPayload, JobFailure, JobId};

pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use record::{JobFilter, JobRecord, JobStatus, OwnerToken, QueueStats};

/// Default maximum number of worker pickups before a retryable failure
/// becomes terminal.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default wall-clock deadline since enqueue, after which a job is
/// forced to `failed` regardless of lease state.
pub const DEFAULT_JOB_DEADLINE_SECS: u64 = 3600;

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The payload was rejected before enqueue.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The backing store failed. Transient from the job's perspective:
    /// callers retry locally and never record this on the job itself
    /// unless their own retry budget runs out.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Tunables owned by the queue (not by individual workers).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum worker pickups per job.
    pub max_attempts: i32,
    /// Wall-clock deadline since `created_at`.
    pub job_deadline: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            job_deadline: Duration::from_secs(DEFAULT_JOB_DEADLINE_SECS),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `QUEUE_MAX_ATTEMPTS`      | `3`     |
    /// | `QUEUE_JOB_DEADLINE_SECS` | `3600`  |
    pub fn from_env() -> Self {
        let max_attempts: i32 = std::env::var("QUEUE_MAX_ATTEMPTS")
            .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
            .parse()
            .expect("QUEUE_MAX_ATTEMPTS must be a valid i32");

        let deadline_secs: u64 = std::env::var("QUEUE_JOB_DEADLINE_SECS")
            .unwrap_or_else(|_| DEFAULT_JOB_DEADLINE_SECS.to_string())
            .parse()
            .expect("QUEUE_JOB_DEADLINE_SECS must be a valid u64");

        Self {
            max_attempts,
            job_deadline: Duration::from_secs(deadline_secs),
        }
    }
}

/// The durable job-queue contract.
///
/// Ordering: jobs become eligible in creation order (FIFO); a running
/// job whose lease has expired re-enters the eligible pool at its
/// original position, so stalled work is preferred over strictly newer
/// pending jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Validate `payload`, create a `pending` job, and return it.
    /// Never blocks on downstream processing.
    async fn enqueue(&self, payload: GenerationPayload) -> Result<JobRecord, QueueError>;

    /// Atomically claim the oldest eligible job: transition it to
    /// `running`, stamp a fresh `owner_token` and a lease expiring at
    /// now + `lease`, and increment `attempts`. Returns `None` when no
    /// job is eligible — callers sleep with backoff, never spin.
    ///
    /// Two concurrent calls never both claim the same job while both
    /// leases are unexpired.
    async fn dequeue(&self, lease: Duration) -> Result<Option<JobRecord>, QueueError>;

    /// Extend the lease (and optionally update progress) if `owner`
    /// still holds the job. Returns `false` when the lease has been
    /// reassigned or the job left `running` — the caller must abandon
    /// all further side effects for this job.
    async fn heartbeat(
        &self,
        id: JobId,
        owner: OwnerToken,
        lease: Duration,
        progress: Option<i16>,
    ) -> Result<bool, QueueError>;

    /// Record the provider-side job id for observability and
    /// best-effort provider cancellation. Owner-guarded like
    /// [`heartbeat`](Self::heartbeat).
    async fn set_provider_job(
        &self,
        id: JobId,
        owner: OwnerToken,
        provider_job_id: &str,
    ) -> Result<bool, QueueError>;

    /// Transition `running → succeeded`, record `result_ref`, clear the
    /// lease. A no-op returning `false` if `owner` no longer holds the
    /// job (including when it already succeeded — the operation is
    /// idempotent in effect).
    async fn complete(
        &self,
        id: JobId,
        owner: OwnerToken,
        result_ref: &str,
    ) -> Result<bool, QueueError>;

    /// Record a failure. If `failure.kind` is retryable and `attempts`
    /// is below the configured maximum, the job returns to `pending`
    /// for another pickup; otherwise it transitions to terminal
    /// `failed` with `failure` recorded. A no-op returning `false` on
    /// a stale `owner`.
    async fn fail(
        &self,
        id: JobId,
        owner: OwnerToken,
        failure: JobFailure,
    ) -> Result<bool, QueueError>;

    /// Transition `pending`/`running` to `cancelled`. Returns `false`
    /// (no-op) on terminal jobs. A cancelled running job is detected by
    /// its worker at the next poll iteration.
    async fn cancel(&self, id: JobId) -> Result<bool, QueueError>;

    /// Read-only snapshot for status lookups.
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError>;

    /// List jobs, newest first, with optional status filter.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, QueueError>;

    /// Queue-wide counters.
    async fn stats(&self) -> Result<QueueStats, QueueError>;

    /// Force every non-terminal job past the wall-clock deadline to
    /// `failed`, regardless of lease state. Returns the number of jobs
    /// expired. Invoked periodically by workers.
    async fn expire_overdue(&self) -> Result<u64, QueueError>;

    /// Delete terminal jobs that finished more than `older_than` ago.
    /// Returns the number of jobs deleted.
    async fn purge_terminal(&self, older_than: Duration) -> Result<u64, QueueError>;
}
