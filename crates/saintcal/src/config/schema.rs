use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;
use crate::jobs::MAX_LIST_LIMIT;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_spreadsheet_directory")]
    pub spreadsheet_directory: String,
    #[serde(default)]
    pub default_spreadsheet_id: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// 0 disables the limit.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_list_limit_max")]
    pub list_limit_max: u64,
}

fn default_spreadsheet_directory() -> String {
    "spreadsheets".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    100
}

fn default_enqueue_timeout_ms() -> u64 {
    1000
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_list_limit_max() -> u64 {
    MAX_LIST_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            database_path: None,
            spreadsheet_directory: default_spreadsheet_directory(),
            default_spreadsheet_id: None,
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
            list_limit_max: default_list_limit_max(),
        }
    }
}

impl Config {
    /// Configured database file, falling back to the per-user default.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_deref()
            .map(PathBuf::from)
            .or_else(default_database_path)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
