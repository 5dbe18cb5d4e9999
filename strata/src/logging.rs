//! Tracing subscriber setup.
//!
//! Console output goes to stderr through `tracing-subscriber`'s fmt layer.
//! When a log directory is given, a second layer writes to a daily rolling
//! file through `tracing-appender`'s non-blocking writer. The returned
//! [`LoggingGuard`] must be kept alive for buffered file output to be flushed.
//!
//! `RUST_LOG` overrides the default filter.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::{ResourceError, ResourceResult};

/// File name prefix for rolling log files.
pub const LOG_FILE_PREFIX: &str = "strata.log";

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Enable debug output for this crate.
    pub verbose: bool,

    /// Directory for daily rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Set verbose output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Also write logs to daily files in `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn default_directive(&self) -> &'static str {
        if self.verbose {
            "strata=debug,info"
        } else {
            "strata=info,warn"
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Keeps the file writer alive. Dropping it flushes pending log lines.
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`ResourceError::Config`] if the log directory cannot be created
/// or a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> ResourceResult<LoggingGuard> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| ResourceError::Config(format!("failed to install logger: {}", e)))?;

    tracing::debug!(log_dir = ?config.log_dir, "Logging initialized");
    Ok(LoggingGuard { _file: guard })
}

fn file_writer(
    dir: &Path,
) -> ResourceResult<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir).map_err(|e| {
        ResourceError::Config(format!(
            "cannot create log directory {}: {}",
            dir.display(),
            e
        ))
    })?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}
