//! HTTP submission API for the generation job queue.
//!
//! Thin layer over [`genflow_queue::JobQueue`]: submit, inspect, list,
//! and cancel jobs, plus queue-wide stats and a health endpoint.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
