//! Per-job log sink handed to each job execution.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::Level;
use serde::Serialize;

use crate::logging::broadcaster::{LogBroadcaster, LogEvent};

const TARGET: &str = "saintcal::job";

/// One line recorded by a [`JobLogger`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// Log sink scoped to one job.
///
/// Entries are kept in the logger's own buffer, forwarded to the `log`
/// facade tagged with the job id, and optionally broadcast. Clones share the
/// buffer.
#[derive(Clone)]
pub struct JobLogger {
    job_id: String,
    entries: Arc<Mutex<Vec<JobLogEntry>>>,
    broadcaster: Option<LogBroadcaster>,
}

impl JobLogger {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            entries: Arc::new(Mutex::new(Vec::new())),
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: LogBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn debug(&self, message: &str) {
        self.record(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.record(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.record(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.record(Level::Error, message);
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<JobLogEntry> {
        self.lock().clone()
    }

    fn record(&self, level: Level, message: &str) {
        log::log!(target: TARGET, level, "[job {}] {}", self.job_id, message);

        let entry = JobLogEntry {
            timestamp: Utc::now(),
            level: level.as_str().to_string(),
            message: message.to_string(),
        };
        self.lock().push(entry);

        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.send(LogEvent::new(level.as_str(), TARGET, message).for_job(&self.job_id));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JobLogEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job {} log buffer lock was poisoned, recovering", self.job_id);
                poisoned.into_inner()
            }
        }
    }
}
