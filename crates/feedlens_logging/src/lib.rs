//! Shared logging utilities for Feedlens binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "feedlens=info,feedlens_protocol=info";

/// Logging configuration shared by Feedlens binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Also write a daily-rotated log file under the Feedlens home directory.
    pub log_to_file: bool,
}

/// Initialize tracing with a stderr layer and an optional rotating file layer.
///
/// Returns the appender guard when file logging is enabled; the caller must
/// keep it alive for the life of the process or buffered lines are dropped.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<WorkerGuard>> {
    let base_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if config.verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new(DEFAULT_LOG_FILTER)
            }
        })
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(base_filter());

    if config.log_to_file {
        let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
        let appender = tracing_appender::rolling::daily(log_dir, format!("{}.log", config.app_name));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(base_filter());
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry().with(stderr_layer).init();
        Ok(None)
    }
}

/// Get the Feedlens home directory: ~/.feedlens
pub fn feedlens_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FEEDLENS_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".feedlens")
}

/// Get the logs directory: ~/.feedlens/logs
pub fn logs_dir() -> PathBuf {
    feedlens_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
