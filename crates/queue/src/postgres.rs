//! Postgres-backed [`JobQueue`].
//!
//! Every mutation is a single conditional `UPDATE` guarded by
//! `status` (and `owner_token` for lease-holder operations), so racing
//! workers are serialized by the store. The claim in [`dequeue`]
//! additionally uses `FOR UPDATE SKIP LOCKED` so concurrent claimants
//! never block each other or double-dispatch a job.
//!
//! [`dequeue`]: JobQueue::dequeue

use std::time::Duration;

use async_trait::async_trait;
use genflow_core::{FailureKind, GenerationPayload, JobFailure, JobId};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::record::{JobFilter, JobRecord, JobStatus, OwnerToken, QueueStats};
use crate::{JobQueue, QueueConfig, QueueError};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, status, payload, attempts, progress, result_ref, error, \
    provider_job_id, owner_token, lease_expires_at, \
    created_at, updated_at, started_at, finished_at";

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from the embedded `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Durable job queue over a Postgres `jobs` table.
pub struct PgJobQueue {
    pool: PgPool,
    config: QueueConfig,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, payload: GenerationPayload) -> Result<JobRecord, QueueError> {
        payload.validate()?;

        let query = format!(
            "INSERT INTO jobs (id, payload) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, JobRecord>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(Json(&payload))
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn dequeue(&self, lease: Duration) -> Result<Option<JobRecord>, QueueError> {
        let query = format!(
            "UPDATE jobs SET \
                 status = 'running', \
                 owner_token = $1, \
                 lease_expires_at = NOW() + make_interval(secs => $2), \
                 attempts = attempts + 1, \
                 started_at = COALESCE(started_at, NOW()), \
                 progress = 0, \
                 updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = 'pending' \
                    OR (status = 'running' AND lease_expires_at <= NOW()) \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, JobRecord>(&query)
            .bind(uuid::Uuid::new_v4())
            .bind(lease.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn heartbeat(
        &self,
        id: JobId,
        owner: OwnerToken,
        lease: Duration,
        progress: Option<i16>,
    ) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET \
                 lease_expires_at = NOW() + make_interval(secs => $3), \
                 progress = COALESCE($4, progress), \
                 updated_at = NOW() \
             WHERE id = $1 AND owner_token = $2 AND status = 'running'",
        )
        .bind(id)
        .bind(owner)
        .bind(lease.as_secs_f64())
        .bind(progress.map(|p| p.clamp(0, 100)))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_provider_job(
        &self,
        id: JobId,
        owner: OwnerToken,
        provider_job_id: &str,
    ) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET provider_job_id = $3, updated_at = NOW() \
             WHERE id = $1 AND owner_token = $2 AND status = 'running'",
        )
        .bind(id)
        .bind(owner)
        .bind(provider_job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        id: JobId,
        owner: OwnerToken,
        result_ref: &str,
    ) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET \
                 status = 'succeeded', \
                 result_ref = $3, \
                 progress = 100, \
                 owner_token = NULL, \
                 lease_expires_at = NULL, \
                 finished_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND owner_token = $2 AND status = 'running'",
        )
        .bind(id)
        .bind(owner)
        .bind(result_ref)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail(
        &self,
        id: JobId,
        owner: OwnerToken,
        failure: JobFailure,
    ) -> Result<bool, QueueError> {
        // Retryable failure below the attempt limit: back to pending.
        if failure.kind.is_retryable() {
            let result = sqlx::query(
                "UPDATE jobs SET \
                     status = 'pending', \
                     owner_token = NULL, \
                     lease_expires_at = NULL, \
                     provider_job_id = NULL, \
                     progress = 0, \
                     updated_at = NOW() \
                 WHERE id = $1 AND owner_token = $2 AND status = 'running' \
                   AND attempts < $3",
            )
            .bind(id)
            .bind(owner)
            .bind(self.config.max_attempts)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() > 0 {
                return Ok(true);
            }
        }

        // Permanent failure, or attempts exhausted: terminal.
        let result = sqlx::query(
            "UPDATE jobs SET \
                 status = 'failed', \
                 error = $3, \
                 owner_token = NULL, \
                 lease_expires_at = NULL, \
                 finished_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND owner_token = $2 AND status = 'running'",
        )
        .bind(id)
        .bind(owner)
        .bind(Json(&failure))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET \
                 status = 'cancelled', \
                 owner_token = NULL, \
                 lease_expires_at = NULL, \
                 finished_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        let record = sqlx::query_as::<_, JobRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, QueueError> {
        let (limit, offset) = filter.limit_offset();

        let where_clause = if filter.status.is_some() {
            "WHERE status = $3"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        );

        let mut q = sqlx::query_as::<_, JobRecord>(&query).bind(limit).bind(offset);
        if let Some(status) = filter.status {
            q = q.bind(status);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.total += count;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Succeeded => stats.succeeded = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::Cancelled => stats.cancelled = count,
            }
        }

        let (leased,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs \
             WHERE status = 'running' AND lease_expires_at > NOW()",
        )
        .fetch_one(&self.pool)
        .await?;
        stats.leased = leased;

        Ok(stats)
    }

    async fn expire_overdue(&self) -> Result<u64, QueueError> {
        let failure = JobFailure::new(
            FailureKind::DeadlineExceeded,
            format!(
                "Job exceeded the {}s wall-clock deadline",
                self.config.job_deadline.as_secs()
            ),
        );
        let result = sqlx::query(
            "UPDATE jobs SET \
                 status = 'failed', \
                 error = $2, \
                 owner_token = NULL, \
                 lease_expires_at = NULL, \
                 finished_at = NOW(), \
                 updated_at = NOW() \
             WHERE status IN ('pending', 'running') \
               AND created_at <= NOW() - make_interval(secs => $1)",
        )
        .bind(self.config.job_deadline.as_secs_f64())
        .bind(Json(&failure))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_terminal(&self, older_than: Duration) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "DELETE FROM jobs \
             WHERE status IN ('succeeded', 'failed', 'cancelled') \
               AND finished_at <= NOW() - make_interval(secs => $1)",
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
