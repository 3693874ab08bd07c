//! Error types shared across the pipeline.
//!
//! [`CoreError`] covers domain-level failures (validation, internal
//! invariant breaches). [`JobFailure`] is the structured failure that
//! gets recorded on a job when it reaches the `failed` state — it is
//! what the dashboard ultimately shows the user.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of a job-level failure.
///
/// The kind decides whether the job is retried: transient kinds count
/// against the attempt budget, permanent kinds terminate the job
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad payload, rejected before or at submission. Never retried.
    Validation,
    /// Queue or object store unavailable after local retries.
    TransientInfra,
    /// 5xx / timeout from the inference provider. Retried up to the
    /// attempt limit.
    TransientProvider,
    /// Explicit provider rejection (e.g. content policy). Never retried.
    PermanentProvider,
    /// Another worker reclaimed the lease mid-processing.
    LeaseLost,
    /// Wall-clock deadline since enqueue exceeded.
    DeadlineExceeded,
}

impl FailureKind {
    /// Whether a failure of this kind should re-enter the pending pool
    /// (subject to the attempt limit).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::TransientInfra | FailureKind::TransientProvider
        )
    }
}

/// Structured failure stored on a failed job (JSONB column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(FailureKind::TransientInfra.is_retryable());
        assert!(FailureKind::TransientProvider.is_retryable());
    }

    #[test]
    fn permanent_kinds_are_not_retryable() {
        assert!(!FailureKind::Validation.is_retryable());
        assert!(!FailureKind::PermanentProvider.is_retryable());
        assert!(!FailureKind::LeaseLost.is_retryable());
        assert!(!FailureKind::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn failure_kind_wire_format() {
        let json = serde_json::to_string(&FailureKind::TransientProvider).unwrap();
        assert_eq!(json, "\"transient_provider\"");
    }

    #[test]
    fn job_failure_round_trips() {
        let failure = JobFailure::new(FailureKind::PermanentProvider, "content policy");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "permanent_provider");
        assert_eq!(json["message"], "content policy");
    }
}
