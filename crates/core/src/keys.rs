//! Artifact key derivation.
//!
//! Keys are job-id-addressed, so they are collision-free per job and
//! the queue, worker, and object store never need to negotiate names.

use crate::types::JobId;

/// Key under which artifact `index` of a job is stored,
/// e.g. `jobs/018f.../0.png`.
pub fn artifact_key(job_id: JobId, index: usize, ext: &str) -> String {
    format!("jobs/{job_id}/{index}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shape() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            artifact_key(id, 0, "png"),
            "jobs/00000000-0000-0000-0000-000000000000/0.png"
        );
    }

    #[test]
    fn distinct_indexes_distinct_keys() {
        let id = uuid::Uuid::now_v7();
        assert_ne!(artifact_key(id, 0, "png"), artifact_key(id, 1, "png"));
    }
}
