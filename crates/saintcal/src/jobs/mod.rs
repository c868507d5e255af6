//! Asynchronous import job tracking.

pub mod progress;
pub mod result;
pub mod status;
pub mod tracker;

pub use progress::{JobProgressBroadcaster, JobProgressEvent};
pub use result::{
    DatabaseSummary, FullImportSummary, JobResultData, LocationImportSummary, ValidationSummary,
};
pub use status::{InvalidTransition, JobStatus, JobTransition, JobType};
pub use tracker::{Job, JobTracker, JobView, RecoveryReport, WorkerUpdate, MAX_LIST_LIMIT};
