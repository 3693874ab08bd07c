//! Handlers for queue-wide observability.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue/stats
///
/// Queue-wide counters per status, plus the number of live leases.
pub async fn get_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = state.queue.stats().await?;
    Ok(Json(DataResponse { data: stats }))
}
