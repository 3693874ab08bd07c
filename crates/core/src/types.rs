/// Job identifiers are UUIDv7: globally unique, assigned at enqueue
/// time, and time-ordered so FIFO tie-breaking can use them directly.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
