//! Worker tuning knobs.

use std::time::Duration;

use genflow_core::{BackoffConfig, TaskKind};

/// Default lease duration stamped on claimed jobs.
const DEFAULT_LEASE_SECS: u64 = 120;
/// Default interval between provider polls for image jobs.
const DEFAULT_IMAGE_POLL_SECS: u64 = 5;
/// Default interval between provider polls for video jobs.
const DEFAULT_VIDEO_POLL_SECS: u64 = 10;
/// Default maximum wall-clock wait on the provider for image jobs.
const DEFAULT_IMAGE_WAIT_SECS: u64 = 600;
/// Default maximum wall-clock wait on the provider for video jobs.
const DEFAULT_VIDEO_WAIT_SECS: u64 = 900;
/// Default interval between maintenance sweeps.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
/// Default retention of terminal jobs before purge.
const DEFAULT_RETENTION_SECS: u64 = 24 * 3600;

/// Runtime settings for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Lease duration for claims and heartbeat renewals.
    pub lease: Duration,
    /// Provider poll interval for image jobs.
    pub image_poll_interval: Duration,
    /// Provider poll interval for video jobs.
    pub video_poll_interval: Duration,
    /// Maximum wait for the provider to finish an image job.
    pub image_wait: Duration,
    /// Maximum wait for the provider to finish a video job.
    pub video_wait: Duration,
    /// Interval between deadline-expiry and retention sweeps.
    pub sweep_interval: Duration,
    /// How long terminal jobs are kept before being purged.
    pub retention: Duration,
    /// Backoff applied when the queue is empty.
    pub idle_backoff: BackoffConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(DEFAULT_LEASE_SECS),
            image_poll_interval: Duration::from_secs(DEFAULT_IMAGE_POLL_SECS),
            video_poll_interval: Duration::from_secs(DEFAULT_VIDEO_POLL_SECS),
            image_wait: Duration::from_secs(DEFAULT_IMAGE_WAIT_SECS),
            video_wait: Duration::from_secs(DEFAULT_VIDEO_WAIT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            idle_backoff: BackoffConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Read worker settings from the environment, falling back to
    /// defaults for anything unset.
    ///
    /// | Variable                   | Default |
    /// |----------------------------|---------|
    /// | `WORKER_LEASE_SECS`        | `120`   |
    /// | `WORKER_IMAGE_POLL_SECS`   | `5`     |
    /// | `WORKER_VIDEO_POLL_SECS`   | `10`    |
    /// | `WORKER_IMAGE_WAIT_SECS`   | `600`   |
    /// | `WORKER_VIDEO_WAIT_SECS`   | `900`   |
    /// | `WORKER_SWEEP_SECS`        | `60`    |
    /// | `WORKER_RETENTION_SECS`    | `86400` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lease: env_secs("WORKER_LEASE_SECS", defaults.lease),
            image_poll_interval: env_secs("WORKER_IMAGE_POLL_SECS", defaults.image_poll_interval),
            video_poll_interval: env_secs("WORKER_VIDEO_POLL_SECS", defaults.video_poll_interval),
            image_wait: env_secs("WORKER_IMAGE_WAIT_SECS", defaults.image_wait),
            video_wait: env_secs("WORKER_VIDEO_WAIT_SECS", defaults.video_wait),
            sweep_interval: env_secs("WORKER_SWEEP_SECS", defaults.sweep_interval),
            retention: env_secs("WORKER_RETENTION_SECS", defaults.retention),
            idle_backoff: defaults.idle_backoff,
        }
    }

    /// Provider poll interval for the given task.
    pub fn poll_interval(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::TextToImage => self.image_poll_interval,
            TaskKind::TextToVideo => self.video_poll_interval,
        }
    }

    /// Maximum provider wait for the given task.
    pub fn provider_wait(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::TextToImage => self.image_wait,
            TaskKind::TextToVideo => self.video_wait,
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
