use std::path::PathBuf;
use thiserror::Error;

use crate::dates::DateFormatError;

#[derive(Error, Debug)]
pub enum SaintcalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Event generation error: {0}")]
    Event(#[from] EventError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Job tracker failures, split the way callers must react to them.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("User '{user_id}' does not own job {job_id}")]
    Unauthorized { job_id: String, user_id: String },

    #[error("Job {job_id} cannot be {action}: {reason}")]
    InvalidState {
        job_id: String,
        action: &'static str,
        reason: String,
    },

    #[error("Invalid job request: {0}")]
    Validation(String),

    /// Persistence or queue I/O failure; the same call may succeed later.
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Transient(_))
    }
}

impl From<crate::db::DatabaseError> for JobError {
    fn from(e: crate::db::DatabaseError) -> Self {
        JobError::Transient(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Invalid event filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid date: {0}")]
    Date(#[from] DateFormatError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No spreadsheet id given and no default configured")]
    MissingSpreadsheet,

    #[error("Invalid spreadsheet id '{0}'")]
    InvalidSpreadsheetId(String),

    #[error("Spreadsheet '{id}' not found at '{path}'")]
    NotFound { id: String, path: PathBuf },

    #[error("Failed to read spreadsheet '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse spreadsheet '{id}': {source}")]
    Parse {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse sheet '{sheet}' of spreadsheet '{id}': {source}")]
    Csv {
        id: String,
        sheet: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Event generation failed: {0}")]
    Events(#[from] EventError),

    #[error("Import stopped: {0}")]
    Aborted(#[from] crate::worker::Aborted),
}

impl ImportError {
    /// Failures that no amount of retrying will fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            ImportError::MissingSpreadsheet
            | ImportError::InvalidSpreadsheetId(_)
            | ImportError::NotFound { .. }
            | ImportError::Parse { .. }
            | ImportError::Csv { .. } => true,
            ImportError::Events(EventError::InvalidFilter(_)) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Queue is full (timed out after {0} ms)")]
    QueueFull(u64),
}

impl From<WorkerError> for JobError {
    fn from(e: WorkerError) -> Self {
        JobError::Transient(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SaintcalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_retryability() {
        assert!(JobError::Transient("db busy".into()).is_retryable());
        assert!(!JobError::NotFound("j".into()).is_retryable());
        assert!(!JobError::Unauthorized {
            job_id: "j".into(),
            user_id: "u".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_import_error_permanence() {
        assert!(ImportError::MissingSpreadsheet.is_permanent());
        assert!(!ImportError::Read {
            path: PathBuf::from("/x"),
            source: std::io::Error::other("disk"),
        }
        .is_permanent());
        assert!(!ImportError::Database(crate::db::DatabaseError::Io {
            path: PathBuf::from("/x"),
            source: std::io::Error::other("disk"),
        })
        .is_permanent());
    }

    #[test]
    fn test_error_messages() {
        let e = JobError::InvalidState {
            job_id: "abc".into(),
            action: "retried",
            reason: "status is completed".into(),
        };
        assert_eq!(
            e.to_string(),
            "Job abc cannot be retried: status is completed"
        );
    }
}
