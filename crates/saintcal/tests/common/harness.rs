//! Test harness for isolated job execution.
//!
//! `TestHarness` owns a temp directory with a file database and a
//! spreadsheet directory, a `JobTracker` on a bounded channel queue, and an
//! optional worker pool.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use saintcal::import::{DirectorySource, ImportRunner, SpreadsheetSource, Workbook};
use saintcal::jobs::{Job, JobTracker};
use saintcal::worker::{ChannelQueue, JobExecutor, WorkerPool, WorkerSettings};
use saintcal::Database;

/// Saint-day year used by every harness runner.
pub const EVENT_YEAR: i32 = 2025;

pub struct TestHarness {
    temp_dir: TempDir,
    pub sheets_dir: PathBuf,
    pub db: Database,
    pub queue: ChannelQueue,
    pub tracker: JobTracker,
    pool: Option<WorkerPool>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let sheets_dir = temp_dir.path().join("sheets");
        std::fs::create_dir_all(&sheets_dir).expect("Failed to create sheets dir");

        let db = Database::open(&temp_dir.path().join("data").join("saintcal.db"))
            .expect("Failed to open database");
        let queue = ChannelQueue::new(32, Duration::from_millis(50));
        let tracker = JobTracker::new(db.clone(), Arc::new(queue.clone()));

        Self {
            temp_dir,
            sheets_dir,
            db,
            queue,
            tracker,
            pool: None,
        }
    }

    /// Path of the harness database file, for opening a second handle.
    pub fn database_path(&self) -> PathBuf {
        self.temp_dir.path().join("data").join("saintcal.db")
    }

    /// Writes `<sheets_dir>/<id>.json`.
    pub fn write_workbook(&self, id: &str, workbook: &Workbook) -> PathBuf {
        let path = self.sheets_dir.join(format!("{}.json", id));
        let json = serde_json::to_string_pretty(workbook).expect("Failed to serialize workbook");
        std::fs::write(&path, json).expect("Failed to write workbook");
        path
    }

    pub fn directory_source(&self) -> DirectorySource {
        DirectorySource::new(&self.sheets_dir)
    }

    pub fn runner(&self, source: Arc<dyn SpreadsheetSource>) -> ImportRunner {
        ImportRunner::new(self.db.clone(), source).with_event_year(EVENT_YEAR)
    }

    /// Starts workers running imports from the sheets directory.
    pub fn start_workers(&mut self, count: usize) {
        let runner = self.runner(Arc::new(self.directory_source()));
        self.start_workers_with(count, Arc::new(runner), None);
    }

    pub fn start_workers_with(
        &mut self,
        count: usize,
        executor: Arc<dyn JobExecutor>,
        job_timeout: Option<Duration>,
    ) {
        assert!(self.pool.is_none(), "workers already running");
        let pool = WorkerPool::start(
            self.queue.receiver(),
            self.tracker.clone(),
            executor,
            WorkerSettings {
                worker_count: count,
                job_timeout,
                poll_interval: Duration::from_millis(10),
                log_broadcaster: None,
            },
        )
        .expect("Failed to start workers");
        self.pool = Some(pool);
    }

    /// Stops the pool and waits for in-flight jobs to return.
    pub fn stop_workers(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
            pool.wait();
        }
    }

    /// Polls until the job is terminal, panicking after `timeout`.
    pub fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Job {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self
                .tracker
                .find(job_id)
                .expect("Failed to read job")
                .expect("Job disappeared");
            if job.is_complete() {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "job {} still {} after {:?}",
                job_id,
                job.status,
                timeout
            );
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.stop_workers();
    }
}
