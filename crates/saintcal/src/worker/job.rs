use crate::jobs::JobType;

/// Message handed from the tracker to the workers.
///
/// The durable job row is the source of truth; this only says which row to
/// pick up. The same job may be delivered more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: String,
    pub user_id: String,
    pub job_type: JobType,
    pub spreadsheet_id: Option<String>,
    /// Attempt number this delivery belongs to, starting at 1.
    pub attempt: i64,
}
