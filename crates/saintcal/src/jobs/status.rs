//! Job status, job type and the single transition table every job
//! operation goes through.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Completed, failed or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending or processing.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Applies `transition`, returning the next status or why it is not allowed.
    pub fn apply(self, transition: JobTransition) -> Result<JobStatus, InvalidTransition> {
        use JobStatus::*;
        use JobTransition as T;

        let next = match (self, transition) {
            (Pending, T::Start) => Processing,
            (Pending | Processing, T::Progress) => Processing,
            (Processing, T::Complete) => Completed,
            (Pending | Processing, T::Fail) => Failed,
            (Pending | Processing, T::Cancel) => Cancelled,
            (Failed, T::Retry { permanent: false }) => Pending,
            (Failed, T::Retry { permanent: true }) => {
                return Err(InvalidTransition {
                    from: self,
                    transition,
                    reason: "the failure is marked permanent".to_string(),
                })
            }
            _ => {
                return Err(InvalidTransition {
                    from: self,
                    transition,
                    reason: format!("status is {}", self),
                })
            }
        };
        Ok(next)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Validation,
    Database,
    FullImport,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Validation => "validation",
            JobType::Database => "database",
            JobType::FullImport => "full-import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(JobType::Validation),
            "database" => Some(JobType::Database),
            "full-import" => Some(JobType::FullImport),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested change of job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    /// Worker picked the job up.
    Start,
    /// Worker reported progress.
    Progress,
    Complete,
    Fail,
    /// User cancellation.
    Cancel,
    /// User retry; `permanent` is the failed job's permanence flag.
    Retry { permanent: bool },
}

impl JobTransition {
    /// Past-tense verb used in error messages ("cannot be cancelled").
    pub fn action(&self) -> &'static str {
        match self {
            JobTransition::Start => "started",
            JobTransition::Progress => "updated",
            JobTransition::Complete => "completed",
            JobTransition::Fail => "failed",
            JobTransition::Cancel => "cancelled",
            JobTransition::Retry { .. } => "retried",
        }
    }
}

/// A transition the state machine rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub transition: JobTransition,
    pub reason: String,
}
