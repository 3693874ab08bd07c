//! Domain logic for the generation pipeline: payload model and
//! validation, failure taxonomy, backoff policy, and artifact key
//! derivation.
//!
//! This crate performs no I/O. Everything here is pure and unit-tested;
//! the queue, provider, storage, and worker crates build on top of it.

pub mod backoff;
pub mod error;
pub mod keys;
pub mod payload;
pub mod types;

pub use backoff::{next_delay, Backoff, BackoffConfig};
pub use error::{CoreError, FailureKind, JobFailure};
pub use payload::{GenerationPayload, TaskKind, TextToImageParams, TextToVideoParams};
pub use types::{JobId, Timestamp};
