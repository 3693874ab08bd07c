//! Client for the external serverless inference provider.
//!
//! The provider exposes an asynchronous protocol: submit a job, poll
//! its status, fetch the artifact once completed, cancel if needed.
//! [`InferenceProvider`] is the seam the worker programs against;
//! [`RunPodClient`] is the HTTP implementation.

pub mod input;
pub mod runpod;

use async_trait::async_trait;
use genflow_core::{FailureKind, GenerationPayload};
use serde::Deserialize;

pub use runpod::{RunPodClient, RunPodConfig};

/// Coarse provider-side job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProviderStatus {
    /// Accepted, waiting for a provider worker.
    #[serde(rename = "IN_QUEUE", alias = "PENDING")]
    Queued,
    /// A provider worker is generating.
    #[serde(rename = "IN_PROGRESS", alias = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "TIMED_OUT")]
    TimedOut,
}

impl ProviderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProviderStatus::Queued | ProviderStatus::Running)
    }
}

/// One poll observation.
#[derive(Debug, Clone)]
pub struct PollResponse {
    pub status: ProviderStatus,
    /// Provider-reported progress (0–100), when available.
    pub progress: Option<i16>,
    /// Provider-reported error message, when failed.
    pub error: Option<String>,
}

/// A fetched result artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

/// Errors from the provider client.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider answered 2xx but the body was unusable
    /// (missing fields, bad base64, no output on a completed job).
    #[error("Unusable provider response: {0}")]
    Decode(String),

    /// The provider explicitly rejected the job (e.g. content policy).
    #[error("Provider rejected the job: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Whether retrying (at the call site or at the job level) can
    /// plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(_) => true,
            ProviderError::Api { status, .. } => *status >= 500 || *status == 429,
            ProviderError::Decode(_) => false,
            ProviderError::Rejected(_) => false,
        }
    }

    /// The job-level failure classification for this error.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_transient() {
            FailureKind::TransientProvider
        } else {
            FailureKind::PermanentProvider
        }
    }
}

/// Failure-message markers meaning the payload itself was rejected.
/// Resubmitting the same payload fails the same way, so these are not
/// worth a retry.
const PERMANENT_FAILURE_MARKERS: &[&str] = &[
    "content policy",
    "nsfw",
    "safety checker",
    "invalid input",
    "unsupported",
];

/// Classify a failure message reported by the provider on a job it had
/// already accepted.
///
/// Infrastructure trouble (OOM, worker crash, capacity) reads as
/// transient; an explicit rejection of the payload reads as permanent.
pub fn classify_failure(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if PERMANENT_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        FailureKind::PermanentProvider
    } else {
        FailureKind::TransientProvider
    }
}

/// The asynchronous inference protocol.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Submit a payload for generation; returns the provider job id.
    ///
    /// Never retried internally: a duplicate submission is a duplicate
    /// billable generation, so the caller supplies `idempotency_key`
    /// and decides when a re-submission is a fresh attempt.
    async fn submit(
        &self,
        payload: &GenerationPayload,
        idempotency_key: &str,
    ) -> Result<String, ProviderError>;

    /// Poll the job's status. Idempotent; retried internally on
    /// transient failure with bounded backoff.
    async fn poll(&self, provider_job_id: &str) -> Result<PollResponse, ProviderError>;

    /// Fetch the artifact of a completed job. Idempotent; retried
    /// internally on transient failure with bounded backoff.
    async fn fetch(&self, provider_job_id: &str) -> Result<Artifact, ProviderError>;

    /// Best-effort cancellation of a queued or running provider job.
    async fn cancel(&self, provider_job_id: &str) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        let s: ProviderStatus = serde_json::from_str("\"IN_QUEUE\"").unwrap();
        assert_eq!(s, ProviderStatus::Queued);
        let s: ProviderStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(s, ProviderStatus::Queued);
        let s: ProviderStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(s, ProviderStatus::Running);
        let s: ProviderStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn transient_classification() {
        let err = ProviderError::Api {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.failure_kind(), FailureKind::TransientProvider);

        let err = ProviderError::Api {
            status: 400,
            body: "bad input".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.failure_kind(), FailureKind::PermanentProvider);

        assert!(ProviderError::Api {
            status: 429,
            body: "rate limited".into()
        }
        .is_transient());

        assert!(!ProviderError::Rejected("content policy".into()).is_transient());
    }

    #[test]
    fn reported_failure_classification() {
        assert_eq!(
            classify_failure("CUDA out of memory"),
            FailureKind::TransientProvider
        );
        assert_eq!(
            classify_failure("worker exited unexpectedly"),
            FailureKind::TransientProvider
        );
        assert_eq!(
            classify_failure("Prompt rejected by Content Policy"),
            FailureKind::PermanentProvider
        );
        assert_eq!(
            classify_failure("unsupported scheduler: foo"),
            FailureKind::PermanentProvider
        );
    }
}
