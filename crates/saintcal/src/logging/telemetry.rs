//! Process-wide tracing subscriber installation.

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInstalled,

    #[error("Failed to bridge log records into tracing: {0}")]
    LogBridge(String),
}

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`, and routes `log` records into it.
///
/// Call once per process; later calls return [`TelemetryError::AlreadyInstalled`].
pub fn init(default_filter: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.compact().finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    installed.map_err(|_| TelemetryError::AlreadyInstalled)?;

    LogTracer::init().map_err(|e| TelemetryError::LogBridge(e.to_string()))
}
