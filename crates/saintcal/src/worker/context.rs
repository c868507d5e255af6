//! Per-execution context handed to a job executor.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::jobs::{JobStatus, JobTracker, WorkerUpdate};
use crate::logging::JobLogger;

/// Why an execution stopped before finishing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aborted {
    #[error("job was cancelled")]
    Cancelled,

    #[error("job exceeded its time limit of {} s", .0.as_secs())]
    TimedOut(Duration),
}

/// Everything one job execution may touch: its logger, progress reporting
/// and the cancellation/deadline checks.
pub struct JobContext {
    job_id: String,
    tracker: JobTracker,
    logger: JobLogger,
    started: Instant,
    timeout: Option<Duration>,
}

impl JobContext {
    pub fn new(
        job_id: &str,
        tracker: JobTracker,
        logger: JobLogger,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            tracker,
            logger,
            started: Instant::now(),
            timeout,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Call between major steps. Fails once the deadline has passed or the
    /// job has been cancelled.
    pub fn checkpoint(&self) -> Result<(), Aborted> {
        if let Some(timeout) = self.timeout {
            if self.started.elapsed() >= timeout {
                return Err(Aborted::TimedOut(timeout));
            }
        }

        match self.tracker.is_cancelled(&self.job_id) {
            Ok(true) => Err(Aborted::Cancelled),
            Ok(false) => Ok(()),
            Err(e) => {
                self.logger
                    .warn(&format!("Could not check for cancellation: {}", e));
                Ok(())
            }
        }
    }

    /// Records progress and doubles as a cancellation check: an update the
    /// tracker refuses means the job is no longer ours to run.
    pub fn report(&self, progress: u8, message: &str) -> Result<(), Aborted> {
        self.logger.info(message);
        match self
            .tracker
            .update_progress(&self.job_id, progress, Some(message), None)
        {
            Ok(WorkerUpdate::Applied(_)) => Ok(()),
            Ok(WorkerUpdate::Stale(JobStatus::Cancelled)) | Ok(WorkerUpdate::Missing) => {
                Err(Aborted::Cancelled)
            }
            Ok(WorkerUpdate::Stale(status)) => {
                self.logger
                    .warn(&format!("Job is already {}, stopping", status));
                Err(Aborted::Cancelled)
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Could not record progress: {}", e));
                Ok(())
            }
        }
    }
}
