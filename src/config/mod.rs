//! Configuration management.
//!
//! Two kinds of configuration live here:
//!
//! - [`DatasetSettings`]: application settings loaded from a TOML file
//!   (state directory, store location, scheduler budget, logging).
//! - [`ImportConfig`]: the per-dataset import description, a JSON or YAML
//!   document layered over built-in defaults.

pub mod column;
mod document;
mod import;
pub mod input;
pub mod target;

pub use column::{ColumnRef, ColumnSpec, GluePart};
pub use import::{ImportConfig, SECTIONS};
pub use input::{ColumnMismatchPolicy, Encoding, ExcludeRule, InputFormat, InputSpec};
pub use target::{OperationTag, OperationTags, TargetSpec};

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "DATASET_CONFIG_PATH";

/// Default store field holding a dataset's source files.
pub const DEFAULT_SOURCE_FIELD: &str = "dataset_source_files";

/// Default number of records between progress checkpoints.
pub const DEFAULT_MILESTONE_STEP: u64 = 50;

/// Default number of records between scheduler checks while purging.
pub const DEFAULT_PURGE_CHECK_INTERVAL: u64 = 10;

/// Application settings.
#[derive(Debug, Clone)]
pub struct DatasetSettings {
    /// Directory holding task progress files.
    pub state_dir: PathBuf,
    /// JSON file backing the content store.
    pub store_path: PathBuf,
    /// Store field holding a dataset's source files.
    pub source_field: String,
    /// Run budget and checkpoint cadence.
    pub run: RunSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Run budget and checkpoint cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Wall-clock budget of one invocation; `None` runs until done.
    pub time_budget_secs: Option<u64>,
    /// Records between milestone checkpoints.
    pub milestone_step: u64,
    /// Records between scheduler checks while importing.
    pub check_interval: u64,
    /// Records between scheduler checks while purging.
    pub purge_check_interval: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            time_budget_secs: None,
            milestone_step: DEFAULT_MILESTONE_STEP,
            check_interval: 1,
            purge_check_interval: DEFAULT_PURGE_CHECK_INTERVAL,
        }
    }
}

/// Logging section of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Default filter directive, e.g. `info` or `dataset=debug`.
    pub level: Option<String>,
    /// Append log lines to this file instead of stderr.
    pub file: Option<String>,
}

/// Settings file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// State directory.
    pub state_dir: Option<String>,
    /// Store file.
    pub store_path: Option<String>,
    /// Source file field.
    pub source_field: Option<String>,
    /// Run section.
    pub run: Option<ConfigFileRun>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Run section in the settings file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRun {
    /// Time budget in seconds; 0 disables the budget.
    pub time_budget_secs: Option<u64>,
    /// Milestone step.
    pub milestone_step: Option<u64>,
    /// Import check interval.
    pub check_interval: Option<u64>,
    /// Purge check interval.
    pub purge_check_interval: Option<u64>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        let state_dir = PathBuf::from(".dataset");
        Self {
            store_path: state_dir.join("store.json"),
            state_dir,
            source_field: DEFAULT_SOURCE_FIELD.to_string(),
            run: RunSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl DatasetSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        Self::from_toml(&contents)
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid settings file.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let mut settings = Self::from_config_file(file);
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Loads settings from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. `DATASET_CONFIG_PATH`
    /// 2. Platform-specific config dir (`~/.config/dataset/config.toml` on Linux)
    ///
    /// Returns default settings if no file is found.
    #[must_use]
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                if let Ok(settings) = Self::load_from_file(&path) {
                    return settings;
                }
            }
        }

        let mut settings = Self::default();
        if let Some(base_dirs) = directories::BaseDirs::new() {
            let platform_config = base_dirs.config_dir().join("dataset").join("config.toml");
            if platform_config.exists() {
                if let Ok(loaded) = Self::load_from_file(&platform_config) {
                    return loaded;
                }
            }
            settings.state_dir = base_dirs.data_local_dir().join("dataset");
            settings.store_path = settings.state_dir.join("store.json");
        }

        settings.apply_env_overrides();
        settings
    }

    /// Converts a `ConfigFile` to `DatasetSettings`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut settings = Self::default();

        if let Some(state_dir) = file.state_dir {
            settings.state_dir = PathBuf::from(state_dir);
            settings.store_path = settings.state_dir.join("store.json");
        }
        if let Some(store_path) = file.store_path {
            settings.store_path = PathBuf::from(store_path);
        }
        if let Some(source_field) = file.source_field.filter(|f| !f.is_empty()) {
            settings.source_field = source_field;
        }
        if let Some(run) = file.run {
            settings.run.time_budget_secs = run.time_budget_secs.filter(|s| *s > 0);
            if let Some(step) = run.milestone_step.filter(|s| *s > 0) {
                settings.run.milestone_step = step;
            }
            if let Some(interval) = run.check_interval.filter(|s| *s > 0) {
                settings.run.check_interval = interval;
            }
            if let Some(interval) = run.purge_check_interval.filter(|s| *s > 0) {
                settings.run.purge_check_interval = interval;
            }
        }
        if let Some(logging) = file.logging {
            settings.logging = logging;
        }

        settings
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(format) = std::env::var("DATASET_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(budget) = std::env::var("DATASET_TIME_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.run.time_budget_secs = Some(budget).filter(|s| *s > 0);
        }
    }

    /// Sets the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = path.into();
        self
    }

    /// Sets the store file.
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }
}
