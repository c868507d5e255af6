pub mod context;
pub mod job;
pub mod pool;
pub mod queue;

pub use context::{Aborted, JobContext};
pub use job::QueuedJob;
pub use pool::{JobExecutor, WorkerPool, WorkerSettings};
pub use queue::{ChannelQueue, DeferredQueue, JobQueue};

// Re-export crossbeam_channel for callers wiring their own receivers
pub use crossbeam_channel;
