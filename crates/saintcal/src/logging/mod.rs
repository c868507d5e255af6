//! Logging: per-job log sinks, log streaming and subscriber setup.

pub mod broadcaster;
pub mod job_logger;
pub mod telemetry;

pub use broadcaster::{LogBroadcaster, LogEvent};
pub use job_logger::{JobLogEntry, JobLogger};
pub use telemetry::{init, LogFormat, TelemetryError};
