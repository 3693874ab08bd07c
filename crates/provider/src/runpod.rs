//! REST API client for a RunPod-style serverless endpoint.
//!
//! Wraps the asynchronous endpoint protocol (submit, status polling,
//! result retrieval, cancellation) using [`reqwest`]. Submission is
//! never retried here; status and result reads are idempotent and get
//! a bounded retry with exponential backoff.

use base64::Engine;
use genflow_core::{next_delay, BackoffConfig, GenerationPayload};
use serde::Deserialize;
use serde_json::Value;

use crate::input::provider_input;
use crate::{Artifact, InferenceProvider, PollResponse, ProviderError, ProviderStatus};

/// How many times an idempotent read is attempted before the error is
/// surfaced to the caller.
const READ_ATTEMPTS: u32 = 3;

/// Per-request timeout for the underlying HTTP client.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Connection settings for a serverless inference endpoint.
#[derive(Debug, Clone)]
pub struct RunPodConfig {
    /// Base API URL, e.g. `https://api.runpod.ai/v2`.
    pub api_url: String,
    /// Bearer token for the endpoint.
    pub api_key: String,
    /// Endpoint identifier appended to the base URL.
    pub endpoint_id: String,
}

impl RunPodConfig {
    /// Read connection settings from the environment.
    ///
    /// | Variable              | Default                     |
    /// |-----------------------|-----------------------------|
    /// | `RUNPOD_API_URL`      | `https://api.runpod.ai/v2`  |
    /// | `RUNPOD_API_KEY`      | required                    |
    /// | `RUNPOD_ENDPOINT_ID`  | required                    |
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            api_url: std::env::var("RUNPOD_API_URL")
                .unwrap_or_else(|_| "https://api.runpod.ai/v2".to_string()),
            api_key: std::env::var("RUNPOD_API_KEY")
                .map_err(|_| "RUNPOD_API_KEY must be set".to_string())?,
            endpoint_id: std::env::var("RUNPOD_ENDPOINT_ID")
                .map_err(|_| "RUNPOD_ENDPOINT_ID must be set".to_string())?,
        })
    }
}

/// HTTP client for a single serverless endpoint.
pub struct RunPodClient {
    client: reqwest::Client,
    config: RunPodConfig,
    retry: BackoffConfig,
}

/// Response returned by `POST /run` after accepting a job.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// Endpoint-assigned identifier for the queued job.
    id: String,
}

/// Response returned by `GET /status/{id}`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: ProviderStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RunPodClient {
    pub fn new(config: RunPodConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            config,
            retry: BackoffConfig::default(),
        })
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{path}",
            self.config.api_url.trim_end_matches('/'),
            self.config.endpoint_id
        )
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ProviderError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// `GET /status/{id}`, retried on transient failure.
    async fn read_status(&self, provider_job_id: &str) -> Result<StatusResponse, ProviderError> {
        let url = self.endpoint_url(&format!("status/{provider_job_id}"));

        let mut delay = self.retry.initial_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.config.api_key)
                    .send()
                    .await?;
                Self::parse_response::<StatusResponse>(response).await
            }
            .await;

            match result {
                Ok(status) => return Ok(status),
                Err(err) if err.is_transient() && attempt < READ_ATTEMPTS => {
                    tracing::warn!(
                        provider_job_id,
                        attempt,
                        error = %err,
                        "status read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &self.retry);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Decode a base64-encoded artifact, tolerating a `data:` URL prefix.
fn decode_artifact(data: &str) -> Result<Vec<u8>, ProviderError> {
    let encoded = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ProviderError::Decode(format!("invalid base64 artifact: {e}")))
}

/// Guess a MIME type from an artifact filename.
fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Extract the first artifact from a completed job's `output` document.
///
/// The endpoint returns either an `images` array of
/// `{filename, data}` objects or a bare base64 string under `data`.
fn extract_artifact(output: &Value) -> Result<Artifact, ProviderError> {
    if let Some(images) = output.get("images").and_then(Value::as_array) {
        let first = images
            .first()
            .ok_or_else(|| ProviderError::Decode("completed job has an empty images array".into()))?;
        let data = first
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Decode("image entry is missing base64 data".into()))?;
        let filename = first
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string);
        let content_type = filename
            .as_deref()
            .map(content_type_for)
            .unwrap_or("image/png");
        return Ok(Artifact {
            bytes: decode_artifact(data)?,
            content_type: content_type.to_string(),
            filename,
        });
    }

    if let Some(data) = output.get("data").and_then(Value::as_str) {
        let filename = output
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string);
        let content_type = filename
            .as_deref()
            .map(content_type_for)
            .unwrap_or("application/octet-stream");
        return Ok(Artifact {
            bytes: decode_artifact(data)?,
            content_type: content_type.to_string(),
            filename,
        });
    }

    Err(ProviderError::Decode(
        "completed job output carries no artifact".into(),
    ))
}

/// Read the endpoint's self-reported progress, if present.
fn extract_progress(output: Option<&Value>) -> Option<i16> {
    output?
        .get("progress")
        .and_then(Value::as_i64)
        .map(|p| p.clamp(0, 100) as i16)
}

#[async_trait::async_trait]
impl InferenceProvider for RunPodClient {
    async fn submit(
        &self,
        payload: &GenerationPayload,
        idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "input": provider_input(payload),
        });

        let response = self
            .client
            .post(self.endpoint_url("run"))
            .bearer_auth(&self.config.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        tracing::debug!(provider_job_id = %submitted.id, "job submitted");
        Ok(submitted.id)
    }

    async fn poll(&self, provider_job_id: &str) -> Result<PollResponse, ProviderError> {
        let status = self.read_status(provider_job_id).await?;
        Ok(PollResponse {
            progress: extract_progress(status.output.as_ref()),
            error: status.error,
            status: status.status,
        })
    }

    async fn fetch(&self, provider_job_id: &str) -> Result<Artifact, ProviderError> {
        let status = self.read_status(provider_job_id).await?;
        if status.status != ProviderStatus::Completed {
            return Err(ProviderError::Decode(format!(
                "artifact requested for a job in state {:?}",
                status.status
            )));
        }
        let output = status
            .output
            .ok_or_else(|| ProviderError::Decode("completed job has no output".into()))?;
        extract_artifact(&output)
    }

    async fn cancel(&self, provider_job_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.endpoint_url(&format!("cancel/{provider_job_id}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
