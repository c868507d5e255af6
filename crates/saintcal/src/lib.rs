pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod events;
pub mod import;
pub mod jobs;
pub mod logging;
pub mod worker;

pub use config::{load_config, Config};
pub use dates::{encode_event_date, parse_date, DateFormatError, ParsedDate};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, EventError, ImportError, JobError, Result, SaintcalError, WorkerError,
};
pub use events::{DerivedEvent, EventFilter, EventGenerator, EventKind, GenerateReport};
pub use import::{DirectorySource, ImportRunner, SpreadsheetSource, Workbook};
pub use jobs::{
    Job, JobProgressBroadcaster, JobResultData, JobStatus, JobTracker, JobType, JobView,
};
pub use logging::{JobLogger, LogBroadcaster};
pub use worker::{ChannelQueue, JobContext, JobExecutor, JobQueue, WorkerPool, WorkerSettings};
