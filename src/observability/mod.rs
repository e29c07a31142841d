//! Observability.
//!
//! Installs the process-wide `tracing` subscriber. Metrics are emitted
//! through the `metrics` facade and reach whatever recorder the embedding
//! application installs.

mod logging;

pub use logging::{LOG_FILE_ENV, LOG_FORMAT_ENV, LogFormat, LoggingConfig};

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging from settings with environment overrides.
///
/// # Errors
///
/// Returns an error if logging has already been initialized or the log
/// file cannot be opened.
pub fn init_from_settings(settings: &LoggingSettings, verbose: bool) -> Result<()> {
    init(LoggingConfig::from_settings(Some(settings), verbose))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if logging has already been initialized or the log
/// file cannot be opened.
pub fn init(config: LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: "logging already initialized".to_string(),
        });
    }

    match (&config.file, config.format) {
        (Some(log_file), LogFormat::Json) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (Some(log_file), LogFormat::Pretty) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(false),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
    }

    LOGGING_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "failed to mark logging initialized".to_string(),
    })
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("dataset.log");
        let mut writer = open_log_file(&path).expect("open");
        writer.write_all(b"line\n").expect("write");
        writer.flush().expect("flush");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "line\n");
    }
}
