//! Contract tests for the job-queue semantics, run against the
//! in-memory implementation. These pin the lease/retry/cancellation
//! behaviour every store implementation must provide.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use genflow_core::payload::TextToImageParams;
use genflow_core::{FailureKind, GenerationPayload, JobFailure};
use genflow_queue::{JobQueue, JobStatus, MemoryJobQueue, QueueConfig, QueueError};

const LEASE: Duration = Duration::from_secs(60);
const SHORT_LEASE: Duration = Duration::from_millis(20);

fn payload(prompt: &str) -> GenerationPayload {
    GenerationPayload::TextToImage(TextToImageParams {
        prompt: prompt.to_string(),
        negative_prompt: None,
        width: 512,
        height: 512,
        steps: 20,
        guidance_scale: 8.0,
        seed: None,
        model: None,
        scheduler: None,
    })
}

fn queue() -> MemoryJobQueue {
    MemoryJobQueue::new(QueueConfig {
        max_attempts: 3,
        job_deadline: Duration::from_secs(3600),
    })
}

#[tokio::test]
async fn enqueue_starts_pending_with_zero_attempts() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();

    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Pending);
    assert_eq!(snapshot.attempts, 0);
    assert_eq!(snapshot.result_ref, None);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.owner_token, None);
}

#[tokio::test]
async fn enqueue_rejects_invalid_payload() {
    let queue = queue();
    let err = queue.enqueue(payload("   ")).await.unwrap_err();
    assert_matches!(err, QueueError::Core(_));

    // Nothing was stored.
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn dequeue_is_fifo() {
    let queue = queue();
    let first = queue.enqueue(payload("first")).await.unwrap();
    let second = queue.enqueue(payload("second")).await.unwrap();

    let a = queue.dequeue(LEASE).await.unwrap().unwrap();
    let b = queue.dequeue(LEASE).await.unwrap().unwrap();
    assert_eq!(a.id, first.id);
    assert_eq!(b.id, second.id);
    assert!(queue.dequeue(LEASE).await.unwrap().is_none());
}

#[tokio::test]
async fn dequeue_stamps_lease_and_attempt() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();

    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.attempts, 1);
    assert!(claimed.owner_token.is_some());
    assert!(claimed.lease_expires_at.is_some());
    assert!(claimed.started_at.is_some());
}

#[tokio::test]
async fn concurrent_dequeues_never_share_a_job() {
    let queue = Arc::new(queue());
    for i in 0..20 {
        queue.enqueue(payload(&format!("job {i}"))).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = queue.dequeue(LEASE).await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    let before = all.len();
    all.dedup();
    assert_eq!(before, 20, "every job claimed exactly once");
    assert_eq!(all.len(), 20);
}

#[tokio::test]
async fn expired_lease_is_reclaimed_with_single_increment() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();

    let first = queue.dequeue(SHORT_LEASE).await.unwrap().unwrap();
    assert_eq!(first.attempts, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = queue.dequeue(LEASE).await.unwrap().unwrap();
    assert_eq!(second.id, job.id);
    assert_eq!(second.attempts, 2, "reclaim increments attempts exactly once");
    assert_ne!(second.owner_token, first.owner_token);

    // The original holder has lost the lease.
    let ok = queue
        .heartbeat(job.id, first.owner_token.unwrap(), LEASE, None)
        .await
        .unwrap();
    assert!(!ok);
}

#[tokio::test]
async fn expired_lease_beats_newer_pending_jobs() {
    let queue = queue();
    let stalled = queue.enqueue(payload("stalled")).await.unwrap();
    queue.dequeue(SHORT_LEASE).await.unwrap().unwrap();
    let newer = queue.enqueue(payload("newer")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let reclaimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, stalled.id);
    let next = queue.dequeue(LEASE).await.unwrap().unwrap();
    assert_eq!(next.id, newer.id);
}

#[tokio::test]
async fn stale_owner_operations_are_noops() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    let stale = uuid::Uuid::new_v4();

    assert!(!queue.complete(job.id, stale, "jobs/x/0.png").await.unwrap());
    assert!(!queue
        .fail(
            job.id,
            stale,
            JobFailure::new(FailureKind::TransientProvider, "503"),
        )
        .await
        .unwrap());
    assert!(!queue.heartbeat(job.id, stale, LEASE, Some(50)).await.unwrap());

    // Status untouched by any of the stale calls.
    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Running);
    assert_eq!(snapshot.owner_token, claimed.owner_token);
    assert_eq!(snapshot.progress, 0);
}

#[tokio::test]
async fn complete_is_effectively_idempotent() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    let owner = claimed.owner_token.unwrap();

    assert!(queue.complete(job.id, owner, "jobs/a/0.png").await.unwrap());

    // Second call with the same owner and ref changes nothing.
    assert!(!queue.complete(job.id, owner, "jobs/a/0.png").await.unwrap());

    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert_eq!(snapshot.result_ref.as_deref(), Some("jobs/a/0.png"));
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.owner_token, None);
    assert!(snapshot.finished_at.is_some());
}

#[tokio::test]
async fn retryable_failure_returns_to_pending_until_attempts_exhausted() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();

    // Attempts 1 and 2: back to pending, no error recorded.
    for expected_attempt in 1..=2 {
        let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
        assert_eq!(claimed.attempts, expected_attempt);
        assert!(queue
            .fail(
                job.id,
                claimed.owner_token.unwrap(),
                JobFailure::new(FailureKind::TransientProvider, "503"),
            )
            .await
            .unwrap());
        let snapshot = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.owner_token, None);
    }

    // Attempt 3 hits the limit: terminal failure.
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 3);
    assert!(queue
        .fail(
            job.id,
            claimed.owner_token.unwrap(),
            JobFailure::new(FailureKind::TransientProvider, "503"),
        )
        .await
        .unwrap());

    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.attempts, 3);
    assert_eq!(
        snapshot.error.as_ref().map(|e| e.kind),
        Some(FailureKind::TransientProvider)
    );
    assert!(queue.dequeue(LEASE).await.unwrap().is_none());
}

#[tokio::test]
async fn permanent_failure_is_immediately_terminal() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();

    assert!(queue
        .fail(
            job.id,
            claimed.owner_token.unwrap(),
            JobFailure::new(FailureKind::PermanentProvider, "content policy"),
        )
        .await
        .unwrap());

    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.attempts, 1);
    assert_eq!(
        snapshot.error.as_ref().map(|e| e.kind),
        Some(FailureKind::PermanentProvider)
    );
}

#[tokio::test]
async fn cancel_pending_is_immediate_and_final() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();

    assert!(queue.cancel(job.id).await.unwrap());
    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Cancelled);

    // Never handed out again; cancelling again is a no-op.
    assert!(queue.dequeue(LEASE).await.unwrap().is_none());
    assert!(!queue.cancel(job.id).await.unwrap());
}

#[tokio::test]
async fn cancel_running_blocks_late_completion() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();

    assert!(queue.cancel(job.id).await.unwrap());

    // The worker that was mid-fetch discovers the terminal state.
    let ok = queue
        .complete(job.id, claimed.owner_token.unwrap(), "jobs/a/0.png")
        .await
        .unwrap();
    assert!(!ok);
    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert_eq!(snapshot.result_ref, None);
}

#[tokio::test]
async fn heartbeat_updates_progress() {
    let queue = queue();
    let job = queue.enqueue(payload("a red fox")).await.unwrap();
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    let owner = claimed.owner_token.unwrap();

    assert!(queue.heartbeat(job.id, owner, LEASE, Some(50)).await.unwrap());
    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.progress, 50);

    // Progress is clamped; heartbeat without progress keeps it.
    assert!(queue.heartbeat(job.id, owner, LEASE, Some(150)).await.unwrap());
    assert!(queue.heartbeat(job.id, owner, LEASE, None).await.unwrap());
    let snapshot = queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.progress, 100);
}

#[tokio::test]
async fn overdue_jobs_are_forced_to_failed() {
    let queue = MemoryJobQueue::new(QueueConfig {
        max_attempts: 3,
        job_deadline: Duration::from_millis(10),
    });
    let pending = queue.enqueue(payload("pending")).await.unwrap();
    let running = queue.enqueue(payload("running")).await.unwrap();
    queue.dequeue(LEASE).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    let expired = queue.expire_overdue().await.unwrap();
    assert_eq!(expired, 2);

    for id in [pending.id, running.id] {
        let snapshot = queue.get(id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(
            snapshot.error.as_ref().map(|e| e.kind),
            Some(FailureKind::DeadlineExceeded)
        );
    }
}

#[tokio::test]
async fn purge_removes_only_old_terminal_jobs() {
    let queue = queue();
    let done = queue.enqueue(payload("done")).await.unwrap();
    let open = queue.enqueue(payload("open")).await.unwrap();

    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();
    queue
        .complete(done.id, claimed.owner_token.unwrap(), "jobs/a/0.png")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let purged = queue.purge_terminal(Duration::from_millis(1)).await.unwrap();
    assert_eq!(purged, 1);

    assert!(queue.get(done.id).await.unwrap().is_none());
    assert!(queue.get(open.id).await.unwrap().is_some());
}

#[tokio::test]
async fn list_and_stats_reflect_queue_contents() {
    let queue = queue();
    for i in 0..3 {
        queue.enqueue(payload(&format!("job {i}"))).await.unwrap();
    }
    let claimed = queue.dequeue(LEASE).await.unwrap().unwrap();

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.leased, 1);

    let running_only = queue
        .list(&genflow_queue::JobFilter {
            status: Some(JobStatus::Running),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(running_only.len(), 1);
    assert_eq!(running_only[0].id, claimed.id);

    let all = queue.list(&genflow_queue::JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    // Newest first.
    assert!(all[0].created_at >= all[2].created_at);
}
