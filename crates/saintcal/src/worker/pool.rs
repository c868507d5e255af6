use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::error::{ImportError, JobError, WorkerError};
use crate::jobs::{JobResultData, JobTracker, WorkerUpdate};
use crate::logging::{JobLogger, LogBroadcaster};
use crate::worker::context::{Aborted, JobContext};
use crate::worker::job::QueuedJob;

/// Times a worker tries to record a job's outcome before giving up.
const SETTLE_ATTEMPTS: u32 = 5;

/// Runs the work behind one job.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &QueuedJob, ctx: &JobContext) -> Result<JobResultData, ImportError>;
}

/// Pool tuning.
#[derive(Clone)]
pub struct WorkerSettings {
    pub worker_count: usize,
    /// Wall-clock limit per execution, enforced at checkpoints.
    pub job_timeout: Option<Duration>,
    /// How long an idle worker waits on the queue before rechecking shutdown.
    pub poll_interval: Duration,
    pub log_broadcaster: Option<LogBroadcaster>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            job_timeout: None,
            poll_interval: Duration::from_millis(100),
            log_broadcaster: None,
        }
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `settings.worker_count` threads pulling from `receiver`.
    pub fn start(
        receiver: Receiver<QueuedJob>,
        tracker: JobTracker,
        executor: Arc<dyn JobExecutor>,
        settings: WorkerSettings,
    ) -> Result<Self, WorkerError> {
        let worker_count = settings.worker_count.max(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_tracker = tracker.clone();
            let worker_executor = Arc::clone(&executor);
            let worker_settings = settings.clone();

            let spawned = thread::Builder::new()
                .name(format!("saintcal-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        shutdown_flag,
                        worker_tracker,
                        worker_executor,
                        worker_settings,
                    );
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown.store(true, Ordering::Relaxed);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", worker_count);

        Ok(Self { workers, shutdown })
    }

    /// Asks every worker to stop after its current job.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Blocks until every worker has exited. Call [`shutdown`](Self::shutdown) first.
    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<QueuedJob>,
    shutdown: Arc<AtomicBool>,
    tracker: JobTracker,
    executor: Arc<dyn JobExecutor>,
    settings: WorkerSettings,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(settings.poll_interval) {
            Ok(job) => process_job(worker_id, &job, &tracker, executor.as_ref(), &settings),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Claims, runs and settles one delivery.
pub(crate) fn process_job(
    worker_id: usize,
    job: &QueuedJob,
    tracker: &JobTracker,
    executor: &dyn JobExecutor,
    settings: &WorkerSettings,
) {
    let _span = info_span!(
        "job.execute",
        worker_id,
        job_id = %job.job_id,
        job_type = %job.job_type,
        attempt = job.attempt
    )
    .entered();

    // Claiming through the state machine makes duplicate deliveries no-ops.
    match tracker.start(&job.job_id) {
        Ok(WorkerUpdate::Applied(_)) => {}
        Ok(WorkerUpdate::Stale(status)) => {
            debug!(
                "Worker {} skipping job {}: already {}",
                worker_id, job.job_id, status
            );
            return;
        }
        Ok(WorkerUpdate::Missing) => return,
        Err(e) => {
            error!(
                "Worker {} could not claim job {}: {}",
                worker_id, job.job_id, e
            );
            return;
        }
    }

    let mut logger = JobLogger::new(&job.job_id);
    if let Some(ref broadcaster) = settings.log_broadcaster {
        logger = logger.with_broadcaster(broadcaster.clone());
    }
    let ctx = JobContext::new(&job.job_id, tracker.clone(), logger, settings.job_timeout);

    let outcome = executor.execute(job, &ctx);
    match &outcome {
        Ok(_) => {}
        Err(ImportError::Aborted(Aborted::Cancelled)) => {
            ctx.logger().info("Stopped after cancellation");
            return;
        }
        Err(e) => ctx.logger().error(&e.to_string()),
    }

    let settled = settle_with_retry(&job.job_id, || match &outcome {
        Ok(data) => tracker.complete(&job.job_id, data),
        Err(ImportError::Aborted(timeout @ Aborted::TimedOut(_))) => {
            tracker.fail(&job.job_id, &timeout.to_string(), false)
        }
        Err(e) => tracker.fail(&job.job_id, &e.to_string(), e.is_permanent()),
    });

    match settled {
        Ok(WorkerUpdate::Applied(finished)) => {
            info!("Job {} finished as {}", finished.id, finished.status)
        }
        Ok(other) => warn!("Job {} result discarded: {:?}", job.job_id, other),
        Err(e) => error!(
            "Job {} result could not be recorded after {} attempts, it stays processing until the next recovery: {}",
            job.job_id, SETTLE_ATTEMPTS, e
        ),
    }
}

/// Repeats `settle` while it fails with a retryable store error.
fn settle_with_retry<F>(job_id: &str, mut settle: F) -> Result<WorkerUpdate, JobError>
where
    F: FnMut() -> Result<WorkerUpdate, JobError>,
{
    let mut attempt = 1;
    loop {
        match settle() {
            Err(e) if e.is_retryable() && attempt < SETTLE_ATTEMPTS => {
                warn!(
                    "Recording result of job {} failed (attempt {}): {}",
                    job_id, attempt, e
                );
                thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::{JobStatus, JobType, ValidationSummary};
    use crate::worker::queue::ChannelQueue;
    use std::time::Instant;

    struct Fixed(fn(&JobContext) -> Result<JobResultData, ImportError>);

    impl JobExecutor for Fixed {
        fn execute(&self, _job: &QueuedJob, ctx: &JobContext) -> Result<JobResultData, ImportError> {
            (self.0)(ctx)
        }
    }

    fn ok(_ctx: &JobContext) -> Result<JobResultData, ImportError> {
        Ok(JobResultData::Validation(ValidationSummary::default()))
    }

    fn setup() -> (JobTracker, ChannelQueue) {
        let db = Database::open_in_memory().unwrap();
        let queue = ChannelQueue::new(16, Duration::from_millis(10));
        (JobTracker::new(db, Arc::new(queue.clone())), queue)
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            worker_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_process_job_completes() {
        let (tracker, queue) = setup();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        let delivery = queue.receiver().try_recv().unwrap();

        process_job(0, &delivery, &tracker, &Fixed(ok), &settings());

        let job = tracker.find(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_duplicate_delivery_is_skipped() {
        let (tracker, queue) = setup();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        let delivery = queue.receiver().try_recv().unwrap();

        process_job(0, &delivery, &tracker, &Fixed(ok), &settings());
        let first = tracker.find(&id).unwrap().unwrap();
        process_job(0, &delivery, &tracker, &Fixed(ok), &settings());
        let second = tracker.find(&id).unwrap().unwrap();
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[test]
    fn test_permanent_and_transient_failures() {
        let (tracker, queue) = setup();
        let rx = queue.receiver();

        let permanent = tracker.submit("alice", JobType::Database, None).unwrap();
        process_job(
            0,
            &rx.try_recv().unwrap(),
            &tracker,
            &Fixed(|_| Err(ImportError::MissingSpreadsheet)),
            &settings(),
        );
        let job = tracker.find(&permanent).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!job.can_retry());

        let transient = tracker.submit("alice", JobType::Database, None).unwrap();
        process_job(
            0,
            &rx.try_recv().unwrap(),
            &tracker,
            &Fixed(|_| {
                Err(ImportError::Read {
                    path: "/data/sheet.json".into(),
                    source: std::io::Error::other("disk unplugged"),
                })
            }),
            &settings(),
        );
        assert!(tracker.find(&transient).unwrap().unwrap().can_retry());
    }

    #[test]
    fn test_timeout_fails_job_as_retryable() {
        let (tracker, queue) = setup();
        let id = tracker.submit("alice", JobType::Database, None).unwrap();
        let delivery = queue.receiver().try_recv().unwrap();
        let settings = WorkerSettings {
            job_timeout: Some(Duration::ZERO),
            ..settings()
        };

        process_job(
            0,
            &delivery,
            &tracker,
            &Fixed(|ctx| {
                ctx.checkpoint()?;
                ok(ctx)
            }),
            &settings,
        );

        let job = tracker.find(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("time limit"));
        assert!(job.can_retry());
    }

    #[test]
    fn test_job_log_lines_reach_the_broadcaster() {
        let (tracker, queue) = setup();
        let id = tracker.submit("alice", JobType::Validation, None).unwrap();
        let delivery = queue.receiver().try_recv().unwrap();
        let broadcaster = LogBroadcaster::new(16);
        let mut receiver = broadcaster.subscribe();
        let settings = WorkerSettings {
            log_broadcaster: Some(broadcaster),
            ..settings()
        };

        process_job(
            0,
            &delivery,
            &tracker,
            &Fixed(|ctx| {
                ctx.report(50, "Halfway").map_err(ImportError::Aborted)?;
                ok(ctx)
            }),
            &settings,
        );

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.job_id.as_deref(), Some(id.as_str()));
        assert_eq!(event.message, "Halfway");
    }

    #[test]
    fn test_settle_retries_transient_store_errors() {
        let mut calls = 0;
        let result = settle_with_retry("job-1", || {
            calls += 1;
            if calls < 3 {
                Err(JobError::Transient("database is locked".into()))
            } else {
                Ok(WorkerUpdate::Missing)
            }
        });
        assert!(matches!(result, Ok(WorkerUpdate::Missing)));
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result = settle_with_retry("job-2", || {
            calls += 1;
            Err(JobError::Transient("database is locked".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, SETTLE_ATTEMPTS);

        let mut calls = 0;
        let result = settle_with_retry("job-3", || {
            calls += 1;
            Err(JobError::NotFound("job-3".into()))
        });
        assert!(matches!(result, Err(JobError::NotFound(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_pool_runs_submitted_jobs() {
        let (tracker, queue) = setup();
        let pool = WorkerPool::start(
            queue.receiver(),
            tracker.clone(),
            Arc::new(Fixed(ok)),
            WorkerSettings {
                worker_count: 2,
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        )
        .unwrap();

        let ids: Vec<String> = (0..3)
            .map(|_| tracker.submit("alice", JobType::Validation, None).unwrap())
            .collect();

        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let done = ids.iter().all(|id| {
                tracker.find(id).unwrap().unwrap().status == JobStatus::Completed
            });
            if done {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait();

        for id in &ids {
            assert_eq!(
                tracker.find(id).unwrap().unwrap().status,
                JobStatus::Completed
            );
        }
    }
}
