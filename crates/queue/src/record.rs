//! The Job Record: the durable unit of work and its visible lifecycle.

use genflow_core::{GenerationPayload, JobFailure, JobId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Opaque value identifying which worker currently holds a job's lease.
pub type OwnerToken = uuid::Uuid;

/// Job lifecycle status.
///
/// Transitions are monotonic: `pending → running → succeeded | failed |
/// cancelled`, with `running → pending` on a retryable failure or lease
/// expiry. Terminal states never transition back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Stable string form, matching both the wire and the database
    /// representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// A row from the `jobs` table (or its in-memory equivalent).
///
/// The queue's backing store is the sole durable owner of these
/// records; workers hold them only under a lease and mutate them only
/// through the queue's compare-and-write operations.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRecord {
    /// Globally unique, immutable, assigned at enqueue time.
    pub id: JobId,
    pub status: JobStatus,
    /// Validated generation parameters, immutable once enqueued.
    #[sqlx(json)]
    pub payload: GenerationPayload,
    /// Number of worker pickups so far (incremented by `dequeue`).
    pub attempts: i32,
    /// Coarse progress indicator, 0–100.
    pub progress: i16,
    /// Object-store reference, set iff the job succeeded.
    pub result_ref: Option<String>,
    /// Structured failure, set iff the job failed.
    #[sqlx(json(nullable))]
    pub error: Option<JobFailure>,
    /// The provider-side job id, once the payload has been submitted.
    pub provider_job_id: Option<String>,
    /// Current lease holder; `None` while pending or terminal.
    pub owner_token: Option<OwnerToken>,
    /// Lease expiry; a running job past this instant is re-eligible.
    pub lease_expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl JobRecord {
    /// Whether a running job's lease has expired as of `now`.
    pub fn lease_expired(&self, now: Timestamp) -> bool {
        self.status == JobStatus::Running
            && self.lease_expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// Whether this job may be handed to a worker as of `now`.
    pub fn eligible(&self, now: Timestamp) -> bool {
        self.status == JobStatus::Pending || self.lease_expired(now)
    }
}

/// Default page size for job listing.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Maximum page size for job listing.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Filter and pagination for job listing.
#[derive(Debug, Default, Deserialize)]
pub struct JobFilter {
    /// Restrict to one status.
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl JobFilter {
    /// Effective `(limit, offset)` after defaults and capping.
    pub fn limit_offset(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(0, MAX_LIST_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Queue-wide counters for the dashboard's status page.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub cancelled: i64,
    /// Running jobs whose lease is still live.
    pub leased: i64,
}
