//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "DATASET_LOG_FORMAT";

/// Environment variable overriding the log file.
pub const LOG_FILE_ENV: &str = "DATASET_LOG_FILE";

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the configuration from settings, environment and CLI flags.
    ///
    /// `RUST_LOG` takes precedence over the configured level; `verbose`
    /// raises the default level to `debug`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .and_then(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        let level = if verbose {
            "debug".to_string()
        } else {
            settings
                .and_then(|s| s.level.clone())
                .unwrap_or_else(|| "info".to_string())
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let file = std::env::var(LOG_FILE_ENV)
            .ok()
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        Self {
            format,
            filter,
            file,
        }
    }
}
