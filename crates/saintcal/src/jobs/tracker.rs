//! Durable job lifecycle: submission, worker-driven updates and user
//! cancel/retry, all funnelled through [`JobStatus::apply`].
//!
//! Each operation is a single read-check-write transaction on the job row,
//! so a user cancel and a late worker update for the same job can interleave
//! in either order and the job still ends `cancelled`.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::Database;
use crate::error::JobError;
use crate::jobs::progress::{JobProgressBroadcaster, JobProgressEvent};
use crate::jobs::result::JobResultData;
use crate::jobs::status::{InvalidTransition, JobStatus, JobTransition, JobType};
use crate::worker::job::QueuedJob;
use crate::worker::queue::JobQueue;

/// Largest page `list_for_user` ever returns.
pub const MAX_LIST_LIMIT: u64 = 50;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str, job_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Job {}: failed to parse timestamp '{}': {}", job_id, s, e);
            Utc::now()
        })
}

fn parse_status(s: &str, job_id: &str) -> JobStatus {
    JobStatus::parse(s).unwrap_or_else(|| {
        warn!(
            "Unknown job status '{}' for job {}, treating as failed",
            s, job_id
        );
        JobStatus::Failed
    })
}

fn parse_job_type(s: &str, job_id: &str) -> JobType {
    JobType::parse(s).unwrap_or_else(|| {
        warn!(
            "Unknown job type '{}' for job {}, treating as validation",
            s, job_id
        );
        JobType::Validation
    })
}

fn encode_data(data: &JobResultData) -> Result<String, JobError> {
    serde_json::to_string(data)
        .map_err(|e| JobError::Validation(format!("unserializable job result: {}", e)))
}

// ─── Job ────────────────────────────────────────────────────────────────────

/// A job as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub job_type: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JobResultData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on failures that must not be retried.
    pub permanent: bool,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    fn from_row(row: JobRow) -> Self {
        let data = row.data.as_deref().and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| warn!("Job {}: discarding unreadable result data: {}", row.id, e))
                .ok()
        });

        Self {
            status: parse_status(&row.status, &row.id),
            job_type: parse_job_type(&row.job_type, &row.id),
            progress: row.progress.clamp(0, 100) as u8,
            created_at: parse_timestamp(&row.created_at, &row.id),
            updated_at: parse_timestamp(&row.updated_at, &row.id),
            completed_at: row
                .completed_at
                .as_deref()
                .map(|s| parse_timestamp(s, &row.id)),
            data,
            id: row.id,
            user_id: row.user_id,
            spreadsheet_id: row.spreadsheet_id,
            message: row.message,
            error: row.error,
            permanent: row.permanent,
            attempts: row.attempts,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && !self.permanent
    }

    pub fn can_cancel(&self) -> bool {
        self.status.is_active()
    }

    /// Milliseconds between creation and `now`.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds().max(0)
    }

    fn to_queued(&self) -> QueuedJob {
        QueuedJob {
            job_id: self.id.clone(),
            user_id: self.user_id.clone(),
            job_type: self.job_type,
            spreadsheet_id: self.spreadsheet_id.clone(),
            attempt: self.attempts,
        }
    }
}

/// Status response: the job plus the fields computed at read time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub is_complete: bool,
    pub can_retry: bool,
    pub can_cancel: bool,
    pub duration_ms: i64,
}

impl JobView {
    pub fn new(job: Job, now: DateTime<Utc>) -> Self {
        Self {
            is_complete: job.is_complete(),
            can_retry: job.can_retry(),
            can_cancel: job.can_cancel(),
            duration_ms: job.duration_ms(now),
            job,
        }
    }
}

/// Outcome of a worker-driven update.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerUpdate {
    Applied(Job),
    /// The job had already moved on (usually cancelled); nothing was written.
    Stale(JobStatus),
    /// The job no longer exists.
    Missing,
}

impl WorkerUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, WorkerUpdate::Applied(_))
    }
}

/// What [`JobTracker::recover_interrupted`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs found `processing` and failed as interrupted.
    pub failed: usize,
    /// `pending` jobs handed to the queue again.
    pub requeued: usize,
}

enum Caller<'a> {
    User(&'a str),
    Worker,
}

enum Outcome {
    Applied(Job),
    Rejected(InvalidTransition),
    Missing,
}

// ─── JobTracker ─────────────────────────────────────────────────────────────

/// Owns every job row. Holds no job state of its own.
#[derive(Clone)]
pub struct JobTracker {
    db: Database,
    queue: Arc<dyn JobQueue>,
    progress: JobProgressBroadcaster,
    list_limit_max: u64,
}

impl JobTracker {
    pub fn new(db: Database, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            db,
            queue,
            progress: JobProgressBroadcaster::default(),
            list_limit_max: MAX_LIST_LIMIT,
        }
    }

    /// Publishes progress on an existing broadcaster.
    pub fn with_progress(mut self, progress: JobProgressBroadcaster) -> Self {
        self.progress = progress;
        self
    }

    /// Lowers the largest page `list_for_user` returns. Capped at [`MAX_LIST_LIMIT`].
    pub fn with_list_limit(mut self, max: u64) -> Self {
        self.list_limit_max = max.clamp(1, MAX_LIST_LIMIT);
        self
    }

    pub fn progress(&self) -> &JobProgressBroadcaster {
        &self.progress
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates a pending job and enqueues it, returning the job id.
    ///
    /// If the enqueue fails the job is left `failed` (retryable) and the
    /// queue error is returned.
    pub fn submit(
        &self,
        user_id: &str,
        job_type: JobType,
        spreadsheet_id: Option<&str>,
    ) -> Result<String, JobError> {
        if user_id.trim().is_empty() {
            return Err(JobError::Validation("user id must not be empty".to_string()));
        }

        let ts = format_timestamp(now());
        let row = JobRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            job_type: job_type.as_str().to_string(),
            spreadsheet_id: spreadsheet_id
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            status: JobStatus::Pending.as_str().to_string(),
            progress: 0,
            message: "Queued".to_string(),
            data: None,
            error: None,
            permanent: false,
            attempts: 1,
            created_at: ts.clone(),
            updated_at: ts,
            completed_at: None,
        };
        self.db.with_conn(|conn| job_repo::insert(conn, &row))?;

        let job = Job::from_row(row);
        info!(
            "Submitted {} job {} for user {}",
            job.job_type, job.id, job.user_id
        );
        self.progress.send(JobProgressEvent::from_job(&job));
        self.dispatch(&job)?;
        Ok(job.id)
    }

    /// Reads a job without an ownership check. For workers and tooling.
    pub fn find(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        let row = self.db.with_conn(|conn| job_repo::find_by_id(conn, job_id))?;
        Ok(row.map(Job::from_row))
    }

    /// Returns the job if `user_id` owns it.
    pub fn get_status(&self, job_id: &str, user_id: &str) -> Result<JobView, JobError> {
        let job = self
            .find(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        if job.user_id != user_id {
            return Err(JobError::Unauthorized {
                job_id: job_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(JobView::new(job, now()))
    }

    /// Most recent first. `limit` is clamped to `[1, list limit]`.
    pub fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
    ) -> Result<Vec<Job>, JobError> {
        let filter = JobFilter {
            user_id: user_id.to_string(),
            status: status.map(|s| s.as_str().to_string()),
            job_type: job_type.map(|t| t.as_str().to_string()),
            limit: limit.clamp(1, self.list_limit_max),
        };
        let rows = self
            .db
            .with_conn(|conn| job_repo::list_for_user(conn, &filter))?;
        Ok(rows.into_iter().map(Job::from_row).collect())
    }

    // ─── Worker-driven updates ──────────────────────────────────────────────

    /// Moves a pending job to `processing`.
    pub fn start(&self, job_id: &str) -> Result<WorkerUpdate, JobError> {
        self.worker_update(job_id, JobTransition::Start, |row| {
            row.message = "Processing".to_string();
        })
    }

    /// Records progress. Never moves progress backward and never touches a
    /// job that is no longer active.
    pub fn update_progress(
        &self,
        job_id: &str,
        progress: u8,
        message: Option<&str>,
        data: Option<&JobResultData>,
    ) -> Result<WorkerUpdate, JobError> {
        let data = data.map(encode_data).transpose()?;
        let progress = i64::from(progress.min(100));
        self.worker_update(job_id, JobTransition::Progress, |row| {
            row.progress = row.progress.max(progress);
            if let Some(message) = message {
                row.message = message.to_string();
            }
            if data.is_some() {
                row.data = data;
            }
        })
    }

    /// Marks a processing job completed with its result.
    pub fn complete(&self, job_id: &str, data: &JobResultData) -> Result<WorkerUpdate, JobError> {
        let encoded = encode_data(data)?;
        let message = data.summary_line();
        self.worker_update(job_id, JobTransition::Complete, |row| {
            row.progress = 100;
            row.message = message;
            row.data = Some(encoded);
            row.completed_at = Some(row.updated_at.clone());
        })
    }

    /// Marks an active job failed. A `permanent` failure cannot be retried.
    pub fn fail(&self, job_id: &str, error: &str, permanent: bool) -> Result<WorkerUpdate, JobError> {
        self.worker_update(job_id, JobTransition::Fail, |row| {
            row.message = if permanent {
                "Failed permanently".to_string()
            } else {
                "Failed".to_string()
            };
            row.error = Some(error.to_string());
            row.permanent = permanent;
            row.completed_at = Some(row.updated_at.clone());
        })
    }

    /// True when the job was cancelled or has disappeared.
    pub fn is_cancelled(&self, job_id: &str) -> Result<bool, JobError> {
        Ok(match self.find(job_id)? {
            Some(job) => job.status == JobStatus::Cancelled,
            None => true,
        })
    }

    // ─── User operations ────────────────────────────────────────────────────

    /// Cancels a pending or processing job owned by `user_id`.
    pub fn cancel(&self, job_id: &str, user_id: &str) -> Result<Job, JobError> {
        let job = self.user_update(
            job_id,
            user_id,
            |_| JobTransition::Cancel,
            |row| {
                row.message = "Cancelled by user".to_string();
                row.completed_at = Some(row.updated_at.clone());
            },
        )?;
        info!("Job {} cancelled by {}", job_id, user_id);
        Ok(job)
    }

    /// Resets a failed, non-permanent job owned by `user_id` and re-enqueues it.
    pub fn retry(&self, job_id: &str, user_id: &str) -> Result<Job, JobError> {
        let job = self.user_update(
            job_id,
            user_id,
            |row| JobTransition::Retry {
                permanent: row.permanent,
            },
            |row| {
                row.progress = 0;
                row.message = "Queued for retry".to_string();
                row.data = None;
                row.error = None;
                row.permanent = false;
                row.attempts += 1;
                row.completed_at = None;
            },
        )?;
        info!(
            "Job {} retried by {} (attempt {})",
            job_id, user_id, job.attempts
        );
        self.dispatch(&job)?;
        Ok(job)
    }

    /// Start-up recovery after a crash: fails jobs left `processing` and
    /// re-enqueues jobs still `pending`.
    pub fn recover_interrupted(&self) -> Result<RecoveryReport, JobError> {
        let mut report = RecoveryReport::default();

        let processing = self.db.with_conn(|conn| {
            job_repo::find_by_status(conn, JobStatus::Processing.as_str())
        })?;
        for row in processing {
            let update = self.fail(
                &row.id,
                "interrupted: the worker stopped before the job finished",
                false,
            )?;
            if update.is_applied() {
                report.failed += 1;
            }
        }

        report.requeued = self.requeue_pending()?;

        if report.failed > 0 || report.requeued > 0 {
            info!(
                "Recovered jobs: {} interrupted, {} re-enqueued",
                report.failed, report.requeued
            );
        }
        Ok(report)
    }

    /// Hands every `pending` job to the queue again, oldest first. Jobs
    /// delivered twice are skipped by the worker that claims them second.
    pub fn requeue_pending(&self) -> Result<usize, JobError> {
        let pending = self
            .db
            .with_conn(|conn| job_repo::find_by_status(conn, JobStatus::Pending.as_str()))?;
        let count = pending.len();
        for row in pending {
            let job = Job::from_row(row);
            self.queue.enqueue(job.to_queued())?;
        }
        if count > 0 {
            debug!("Re-enqueued {} pending jobs", count);
        }
        Ok(count)
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn dispatch(&self, job: &Job) -> Result<(), JobError> {
        match self.queue.enqueue(job.to_queued()) {
            Ok(()) => {
                debug!("Job {} enqueued (attempt {})", job.id, job.attempts);
                Ok(())
            }
            Err(e) => {
                error!("Failed to enqueue job {}: {}", job.id, e);
                let message = format!("Failed to enqueue job: {}", e);
                if let Err(fail_err) = self.fail(&job.id, &message, false) {
                    warn!("Job {}: could not record enqueue failure: {}", job.id, fail_err);
                }
                Err(e.into())
            }
        }
    }

    fn worker_update<M>(
        &self,
        job_id: &str,
        transition: JobTransition,
        mutate: M,
    ) -> Result<WorkerUpdate, JobError>
    where
        M: FnOnce(&mut JobRow),
    {
        match self.transition(job_id, Caller::Worker, |_| transition, mutate)? {
            Outcome::Applied(job) => Ok(WorkerUpdate::Applied(job)),
            Outcome::Rejected(invalid) => {
                warn!(
                    "Dropping stale update for job {}: cannot be {} ({})",
                    job_id,
                    invalid.transition.action(),
                    invalid.reason
                );
                Ok(WorkerUpdate::Stale(invalid.from))
            }
            Outcome::Missing => {
                warn!("Dropping update for job {}: job no longer exists", job_id);
                Ok(WorkerUpdate::Missing)
            }
        }
    }

    fn user_update<T, M>(
        &self,
        job_id: &str,
        user_id: &str,
        transition: T,
        mutate: M,
    ) -> Result<Job, JobError>
    where
        T: FnOnce(&JobRow) -> JobTransition,
        M: FnOnce(&mut JobRow),
    {
        match self.transition(job_id, Caller::User(user_id), transition, mutate)? {
            Outcome::Applied(job) => Ok(job),
            Outcome::Rejected(invalid) => Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                action: invalid.transition.action(),
                reason: invalid.reason,
            }),
            Outcome::Missing => Err(JobError::NotFound(job_id.to_string())),
        }
    }

    /// Loads, checks and writes one job row in a single transaction.
    fn transition<T, M>(
        &self,
        job_id: &str,
        caller: Caller<'_>,
        transition: T,
        mutate: M,
    ) -> Result<Outcome, JobError>
    where
        T: FnOnce(&JobRow) -> JobTransition,
        M: FnOnce(&mut JobRow),
    {
        let outcome = self.db.with_tx(|tx| -> Result<Outcome, JobError> {
            let Some(mut row) = job_repo::find_by_id(tx, job_id)? else {
                return Ok(Outcome::Missing);
            };

            if let Caller::User(user_id) = caller {
                if row.user_id != user_id {
                    return Err(JobError::Unauthorized {
                        job_id: job_id.to_string(),
                        user_id: user_id.to_string(),
                    });
                }
            }

            let current = parse_status(&row.status, &row.id);
            let next = match current.apply(transition(&row)) {
                Ok(next) => next,
                Err(invalid) => return Ok(Outcome::Rejected(invalid)),
            };

            row.status = next.as_str().to_string();
            row.updated_at = format_timestamp(now());
            mutate(&mut row);
            job_repo::update(tx, &row)?;
            Ok(Outcome::Applied(Job::from_row(row)))
        })?;

        if let Outcome::Applied(ref job) = outcome {
            debug!("Job {} is now {} ({}%)", job.id, job.status, job.progress);
            self.progress.send(JobProgressEvent::from_job(job));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::result::ValidationSummary;
    use crate::worker::queue::ChannelQueue;
    use std::time::Duration;

    fn setup() -> (JobTracker, ChannelQueue) {
        let db = Database::open_in_memory().unwrap();
        let queue = ChannelQueue::new(16, Duration::from_millis(10));
        let tracker = JobTracker::new(db, Arc::new(queue.clone()));
        (tracker, queue)
    }

    fn summary() -> JobResultData {
        JobResultData::Validation(ValidationSummary {
            locations: 1,
            saints: 4,
            ..Default::default()
        })
    }

    #[test]
    fn test_submit_creates_pending_and_enqueues() {
        let (tracker, queue) = setup();
        let id = tracker
            .submit("alice", JobType::Database, Some(" sheet-1 "))
            .unwrap();

        let view = tracker.get_status(&id, "alice").unwrap();
        assert_eq!(view.job.status, JobStatus::Pending);
        assert_eq!(view.job.progress, 0);
        assert_eq!(view.job.spreadsheet_id.as_deref(), Some("sheet-1"));
        assert!(view.can_cancel);
        assert!(!view.can_retry);
        assert!(!view.is_complete);

        let queued = queue.receiver().try_recv().unwrap();
        assert_eq!(queued.job_id, id);
        assert_eq!(queued.job_type, JobType::Database);
        assert_eq!(queued.attempt, 1);
    }

    #[test]
    fn test_submit_rejects_blank_user() {
        let (tracker, _queue) = setup();
        assert!(matches!(
            tracker.submit("  ", JobType::Validation, None),
            Err(JobError::Validation(_))
        ));
    }

    #[test]
    fn test_ownership_is_distinct_from_not_found() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("bob", JobType::Validation, None).unwrap();

        assert!(matches!(
            tracker.get_status(&id, "alice"),
            Err(JobError::Unauthorized { .. })
        ));
        assert!(matches!(
            tracker.get_status("missing", "alice"),
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            tracker.cancel(&id, "alice"),
            Err(JobError::Unauthorized { .. })
        ));
        assert_eq!(
            tracker.get_status(&id, "bob").unwrap().job.status,
            JobStatus::Pending
        );
    }

    #[test]
    fn test_progress_never_moves_backward() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        assert!(tracker.start(&id).unwrap().is_applied());

        tracker.update_progress(&id, 60, Some("Halfway"), None).unwrap();
        tracker.update_progress(&id, 30, None, None).unwrap();

        let job = tracker.find(&id).unwrap().unwrap();
        assert_eq!(job.progress, 60);
        assert_eq!(job.message, "Halfway");
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_update_missing_job_is_silent() {
        let (tracker, _queue) = setup();
        assert_eq!(
            tracker.update_progress("gone", 10, None, None).unwrap(),
            WorkerUpdate::Missing
        );
    }

    #[test]
    fn test_complete_stores_result() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        tracker.start(&id).unwrap();
        tracker.complete(&id, &summary()).unwrap();

        let view = tracker.get_status(&id, "alice").unwrap();
        assert_eq!(view.job.status, JobStatus::Completed);
        assert_eq!(view.job.progress, 100);
        assert_eq!(view.job.data, Some(summary()));
        assert!(view.job.completed_at.is_some());
        assert!(view.job.error.is_none());
        assert!(view.is_complete);
        assert!(!view.can_cancel);
    }

    #[test]
    fn test_cancel_wins_over_late_progress() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::Database, None).unwrap();
        tracker.start(&id).unwrap();
        tracker.cancel(&id, "alice").unwrap();

        assert_eq!(
            tracker.update_progress(&id, 90, Some("Almost"), None).unwrap(),
            WorkerUpdate::Stale(JobStatus::Cancelled)
        );
        assert_eq!(
            tracker.complete(&id, &summary()).unwrap(),
            WorkerUpdate::Stale(JobStatus::Cancelled)
        );
        let job = tracker.find(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.message, "Cancelled by user");
    }

    #[test]
    fn test_cancel_terminal_job_is_invalid_state() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        tracker.start(&id).unwrap();
        tracker.complete(&id, &summary()).unwrap();

        let err = tracker.cancel(&id, "alice").unwrap_err();
        assert!(matches!(err, JobError::InvalidState { action: "cancelled", .. }));
    }

    #[test]
    fn test_retry_after_transient_failure() {
        let (tracker, queue) = setup();
        let rx = queue.receiver();
        let id = tracker.submit("alice", JobType::Database, None).unwrap();
        rx.try_recv().unwrap();

        tracker.start(&id).unwrap();
        tracker.update_progress(&id, 40, None, None).unwrap();
        tracker.fail(&id, "database is locked", false).unwrap();

        let view = tracker.get_status(&id, "alice").unwrap();
        assert_eq!(view.job.error.as_deref(), Some("database is locked"));
        assert!(view.can_retry);

        let job = tracker.retry(&id, "alice").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.attempts, 2);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.job_id, id);
        assert_eq!(queued.attempt, 2);
    }

    #[test]
    fn test_permanent_failure_rejects_retry() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::Database, None).unwrap();
        tracker.start(&id).unwrap();
        tracker.fail(&id, "workbook is not valid JSON", true).unwrap();

        let view = tracker.get_status(&id, "alice").unwrap();
        assert!(!view.can_retry);
        let err = tracker.retry(&id, "alice").unwrap_err();
        match err {
            JobError::InvalidState { action, reason, .. } => {
                assert_eq!(action, "retried");
                assert!(reason.contains("permanent"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retry_requires_failed() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::Database, None).unwrap();
        assert!(matches!(
            tracker.retry(&id, "alice"),
            Err(JobError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_enqueue_failure_leaves_job_retryable() {
        let db = Database::open_in_memory().unwrap();
        let queue = ChannelQueue::new(1, Duration::from_millis(5));
        let tracker = JobTracker::new(db, Arc::new(queue.clone()));

        tracker.submit("alice", JobType::Validation, None).unwrap();
        let err = tracker
            .submit("alice", JobType::Validation, None)
            .unwrap_err();
        assert!(err.is_retryable());

        let failed = tracker
            .list_for_user("alice", 10, Some(JobStatus::Failed), None)
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].can_retry());
        assert!(failed[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed to enqueue job"));
    }

    #[test]
    fn test_list_for_user_clamps_and_filters() {
        let db = Database::open_in_memory().unwrap();
        let queue = ChannelQueue::new(128, Duration::from_millis(10));
        let tracker = JobTracker::new(db, Arc::new(queue)).with_list_limit(5);

        for _ in 0..7 {
            tracker.submit("alice", JobType::Validation, None).unwrap();
        }
        tracker.submit("alice", JobType::FullImport, None).unwrap();
        tracker.submit("bob", JobType::Validation, None).unwrap();

        assert_eq!(tracker.list_for_user("alice", 100, None, None).unwrap().len(), 5);
        assert_eq!(tracker.list_for_user("alice", 0, None, None).unwrap().len(), 1);

        let imports = tracker
            .list_for_user("alice", 50, None, Some(JobType::FullImport))
            .unwrap();
        assert_eq!(imports.len(), 1);
        assert!(imports.iter().all(|j| j.user_id == "alice"));
    }

    #[test]
    fn test_recover_interrupted() {
        let (tracker, queue) = setup();
        let rx = queue.receiver();
        let running = tracker.submit("alice", JobType::Database, None).unwrap();
        let waiting = tracker.submit("alice", JobType::Validation, None).unwrap();
        while rx.try_recv().is_ok() {}
        tracker.start(&running).unwrap();

        let report = tracker.recover_interrupted().unwrap();
        assert_eq!(report, RecoveryReport { failed: 1, requeued: 1 });

        let job = tracker.find(&running).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("interrupted"));
        assert!(job.can_retry());
        assert_eq!(rx.try_recv().unwrap().job_id, waiting);
    }

    #[test]
    fn test_progress_events_published() {
        let (tracker, _queue) = setup();
        let mut rx = tracker.progress().subscribe();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        tracker.start(&id).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.status, JobStatus::Pending);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.status, JobStatus::Processing);
        assert_eq!(second.job_id, id);
    }

    #[test]
    fn test_view_serialization() {
        let (tracker, _queue) = setup();
        let id = tracker.submit("alice", JobType::FullImport, None).unwrap();
        let json = serde_json::to_value(tracker.get_status(&id, "alice").unwrap()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["jobType"], "full-import");
        assert_eq!(json["canCancel"], true);
        assert!(json["durationMs"].as_i64().unwrap() >= 0);
    }
}
