use std::sync::Arc;

use genflow_queue::JobQueue;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// The job queue. `PgJobQueue` in production, `MemoryJobQueue` in
    /// integration tests.
    pub queue: Arc<dyn JobQueue>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
