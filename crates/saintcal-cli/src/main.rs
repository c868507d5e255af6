use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use serde::Serialize;

use saintcal::config::{load_config, Config};
use saintcal::jobs::{JobStatus, JobTracker, JobType, JobView};
use saintcal::logging::{LogBroadcaster, LogFormat};
use saintcal::worker::{ChannelQueue, DeferredQueue, WorkerPool, WorkerSettings};
use saintcal::{Database, DirectorySource, EventFilter, EventGenerator, ImportRunner};

#[derive(Debug, Parser)]
#[command(name = "saintcal")]
#[command(about = "Import job tracking and saint-day event generation")]
struct Cli {
    /// JSON config file; built-in defaults when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormatArg::Text, global = true)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobTypeArg {
    Validation,
    Database,
    FullImport,
}

impl From<JobTypeArg> for JobType {
    fn from(arg: JobTypeArg) -> Self {
        match arg {
            JobTypeArg::Validation => JobType::Validation,
            JobTypeArg::Database => JobType::Database,
            JobTypeArg::FullImport => JobType::FullImport,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Queue an import job
    Submit {
        #[arg(long)]
        user: String,
        #[arg(long = "type", value_enum)]
        job_type: JobTypeArg,
        #[arg(long)]
        spreadsheet: Option<String>,
        /// Run the job in this process and print its final state
        #[arg(long)]
        wait: bool,
        /// With --wait, print the job's log lines as JSON while it runs
        #[arg(long, requires = "wait")]
        follow: bool,
    },
    /// Show one job
    Status {
        job_id: String,
        #[arg(long)]
        user: String,
    },
    /// List a user's most recent jobs
    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: u64,
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        #[arg(long = "type", value_enum)]
        job_type: Option<JobTypeArg>,
    },
    /// Cancel a pending or processing job
    Cancel {
        job_id: String,
        #[arg(long)]
        user: String,
    },
    /// Requeue a job that failed with a retryable error
    Retry {
        job_id: String,
        #[arg(long)]
        user: String,
    },
    /// Create missing events for the selected saints
    Generate {
        #[arg(long)]
        location_id: Option<i64>,
        #[arg(long)]
        saint_id: Option<i64>,
        #[arg(long)]
        saint_number: Option<String>,
        /// Rewrite events that already exist
        #[arg(long)]
        force: bool,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Delete every event and recompute all of them
    RegenerateAll {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Run the worker pool until Ctrl-C
    Worker,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::parse(s).ok_or_else(|| {
        let known: Vec<&str> = JobStatus::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown status '{}', expected one of {}", s, known.join(", "))
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct App {
    config: Config,
    db: Database,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_config(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        let path = match cli.database.clone() {
            Some(path) => path,
            None => config
                .resolved_database_path()
                .context("no database path configured and no home directory found")?,
        };
        let db = Database::open_with_timeout(&path, config.busy_timeout())
            .with_context(|| format!("opening database {}", path.display()))?;

        Ok(Self { config, db })
    }

    /// Tracker for commands that only touch the store. Submitted jobs stay
    /// pending until a worker process picks them up.
    fn store_tracker(&self) -> JobTracker {
        JobTracker::new(self.db.clone(), Arc::new(DeferredQueue))
            .with_list_limit(self.config.list_limit_max)
    }

    fn runner(&self) -> ImportRunner {
        let source = DirectorySource::new(&self.config.spreadsheet_directory);
        ImportRunner::new(self.db.clone(), Arc::new(source))
            .with_default_spreadsheet(self.config.default_spreadsheet_id.clone())
    }

    fn start_pool(
        &self,
        log_broadcaster: Option<LogBroadcaster>,
    ) -> Result<(JobTracker, ChannelQueue, WorkerPool)> {
        let queue = ChannelQueue::new(self.config.queue_capacity, self.config.enqueue_timeout());
        let tracker = JobTracker::new(self.db.clone(), Arc::new(queue.clone()))
            .with_list_limit(self.config.list_limit_max);

        let pool = WorkerPool::start(
            queue.receiver(),
            tracker.clone(),
            Arc::new(self.runner()),
            WorkerSettings {
                worker_count: self.config.worker_count,
                job_timeout: self.config.job_timeout(),
                log_broadcaster,
                ..Default::default()
            },
        )?;
        Ok((tracker, queue, pool))
    }

    fn generator(&self, year: Option<i32>) -> EventGenerator {
        let generator = EventGenerator::new(self.db.clone());
        match year {
            Some(year) => generator.with_year(year),
            None => generator,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogFormatArg::Text => LogFormat::Text,
        LogFormatArg::Json => LogFormat::Json,
    };
    saintcal::logging::init("info", format)?;

    let app = App::open(&cli)?;

    match cli.command {
        Commands::Submit {
            user,
            job_type,
            spreadsheet,
            wait,
            follow,
        } => {
            if wait {
                submit_and_wait(&app, &user, job_type.into(), spreadsheet.as_deref(), follow)?;
            } else {
                let tracker = app.store_tracker();
                let job_id = tracker.submit(&user, job_type.into(), spreadsheet.as_deref())?;
                print_json(&tracker.get_status(&job_id, &user)?)?;
            }
        }
        Commands::Status { job_id, user } => {
            print_json(&app.store_tracker().get_status(&job_id, &user)?)?;
        }
        Commands::List {
            user,
            limit,
            status,
            job_type,
        } => {
            let jobs = app.store_tracker().list_for_user(
                &user,
                limit,
                status,
                job_type.map(JobType::from),
            )?;
            let now = chrono::Utc::now();
            let views: Vec<JobView> = jobs.into_iter().map(|job| JobView::new(job, now)).collect();
            print_json(&views)?;
        }
        Commands::Cancel { job_id, user } => {
            let job = app.store_tracker().cancel(&job_id, &user)?;
            print_json(&JobView::new(job, chrono::Utc::now()))?;
        }
        Commands::Retry { job_id, user } => {
            let job = app.store_tracker().retry(&job_id, &user)?;
            print_json(&JobView::new(job, chrono::Utc::now()))?;
        }
        Commands::Generate {
            location_id,
            saint_id,
            saint_number,
            force,
            year,
        } => {
            let filter = EventFilter {
                location_id,
                saint_id,
                saint_number,
            };
            let report = app.generator(year).generate(&filter, force)?;
            if report.is_empty_selection() {
                warn!("No saints matched the filter");
            }
            print_json(&report)?;
        }
        Commands::RegenerateAll { year } => {
            print_json(&app.generator(year).regenerate_all()?)?;
        }
        Commands::Worker => run_worker(&app)?,
    }

    Ok(())
}

fn submit_and_wait(
    app: &App,
    user: &str,
    job_type: JobType,
    spreadsheet: Option<&str>,
    follow: bool,
) -> Result<()> {
    let broadcaster = follow.then(LogBroadcaster::default);
    let mut job_log = broadcaster.as_ref().map(LogBroadcaster::subscribe);
    let (tracker, _queue, pool) = app.start_pool(broadcaster)?;
    let job_id = tracker.submit(user, job_type, spreadsheet)?;
    info!("Running job {} in-process", job_id);

    let deadline = app
        .config
        .job_timeout()
        .map(|timeout| Instant::now() + timeout + Duration::from_secs(5));
    let view = loop {
        let view = tracker.get_status(&job_id, user)?;
        if let Some(ref mut receiver) = job_log {
            // a lagged receiver resumes from the oldest retained line next round
            while let Ok(event) = receiver.try_recv() {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        if view.is_complete {
            break view;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            pool.shutdown();
            pool.wait();
            bail!("job {} did not finish in time", job_id);
        }
        std::thread::sleep(Duration::from_millis(100));
    };

    pool.shutdown();
    pool.wait();
    print_json(&view)?;

    if view.job.status != JobStatus::Completed {
        bail!(
            "job {} ended as {}: {}",
            job_id,
            view.job.status,
            view.job.error.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(())
}

fn run_worker(app: &App) -> Result<()> {
    let (tracker, queue, pool) = app.start_pool(None)?;

    let recovered = tracker.recover_interrupted()?;
    info!(
        "Worker ready: {} interrupted jobs failed, {} pending jobs queued",
        recovered.failed, recovered.requeued
    );

    let (tx, rx) = mpsc::channel();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        error!("Failed to set Ctrl-C handler: {}", err);
        pool.shutdown();
        pool.wait();
        bail!("cannot run a worker without a Ctrl-C handler: {}", err);
    }

    // Jobs submitted by other processes only exist in the store.
    let rescan = Duration::from_secs(2);
    loop {
        match rx.recv_timeout(rescan) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if queue.is_empty() {
                    if let Err(e) = tracker.requeue_pending() {
                        warn!("Could not pick up pending jobs: {}", e);
                    }
                }
            }
        }
    }

    info!("Shutdown signal received");
    pool.shutdown();
    pool.wait();
    Ok(())
}
