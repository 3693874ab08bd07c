//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use genflow_core::{GenerationPayload, JobId};
use genflow_queue::JobFilter;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/jobs
///
/// Validate the payload and enqueue a new generation job. Returns 201
/// with the created job record; the job starts in `pending` status and
/// is picked up by a worker. Invalid payloads are rejected with 400
/// and never enqueued.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(payload): Json<GenerationPayload>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue.enqueue(payload).await?;

    tracing::info!(
        job_id = %job.id,
        task = job.payload.kind().as_str(),
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/jobs
///
/// List jobs, newest first. Supports optional `status`, `limit`, and
/// `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.queue.list(&filter).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
///
/// Get a single job by ID. This is the dashboard's polling endpoint:
/// it exposes status, progress, attempts, `result_ref`, and the
/// structured error of a failed job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .queue
        .get(job_id)
        .await?
        .ok_or(AppError::JobNotFound(job_id))?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a pending or running job. Returns 204 on success, 404 for an
/// unknown job, 409 if the job is already terminal. Cancellation of a
/// running job takes effect at the worker's next poll iteration.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = state.queue.cancel(job_id).await?;

    if !cancelled {
        if state.queue.get(job_id).await?.is_none() {
            return Err(AppError::JobNotFound(job_id));
        }
        return Err(AppError::Conflict(
            "Job is already in a terminal state and cannot be cancelled".into(),
        ));
    }

    tracing::info!(job_id = %job_id, "Job cancelled");

    Ok(StatusCode::NO_CONTENT)
}
