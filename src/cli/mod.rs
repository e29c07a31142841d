//! CLI command implementations.
//!
//! Each submodule implements one `dataset` command. The binary parses the
//! arguments, loads the [`DatasetSettings`] and hands both to the command.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `import` | Run one invocation of an import task |
//! | `purge` | Run one invocation of a purge task |
//! | `count` | Count the records of a source |
//! | `check` | Validate an import configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Import, resuming where the previous invocation stopped
//! dataset import books.csv --config books.yaml --time-budget 30
//!
//! # Remove everything imported under entity 7
//! dataset purge --config books.yaml --parent 7 --confirm
//! ```

pub mod check;
pub mod count;
pub mod import;
pub mod purge;

pub use check::CheckArgs;
pub use count::CountArgs;
pub use import::ImportArgs;
pub use purge::PurgeArgs;

use crate::config::{DatasetSettings, ImportConfig};
use crate::models::{EntityId, InvocationResult};
use crate::scheduler::LocalScheduler;
use crate::storage::{JsonFileContentStore, ROOT_ID};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store and scheduler shared by the commands of one process.
pub struct CommandContext {
    /// Application settings.
    pub settings: DatasetSettings,
    /// File-backed content store.
    pub store: JsonFileContentStore,
    /// Scheduler persisting progress below the state directory.
    pub scheduler: LocalScheduler,
}

impl CommandContext {
    /// Opens the store and creates the scheduler.
    ///
    /// `time_budget_secs` overrides the configured budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the store file exists but cannot be loaded.
    pub fn open(settings: DatasetSettings, time_budget_secs: Option<u64>) -> Result<Self> {
        let budget = time_budget_secs
            .or(settings.run.time_budget_secs)
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        let store = JsonFileContentStore::open(&settings.store_path)?;
        let scheduler = LocalScheduler::new(&settings.state_dir, budget);
        Ok(Self {
            settings,
            store,
            scheduler,
        })
    }

    /// Returns the dataset parent, checking that it exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the entity does not exist.
    pub fn parent(&self, parent: Option<u64>) -> Result<EntityId> {
        let id = parent.map_or(ROOT_ID, EntityId::new);
        if id != ROOT_ID && self.store.inner().entity(id).is_none() {
            return Err(Error::InvalidInput(format!("dataset parent {id} does not exist")));
        }
        Ok(id)
    }
}

/// Loads an import configuration from the dataset-wide and the per-source
/// documents; either may be absent.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the documents are invalid.
pub fn load_import_config(
    dataset_config: Option<&Path>,
    config: Option<&Path>,
) -> Result<ImportConfig> {
    let layers = [dataset_config, config]
        .into_iter()
        .flatten()
        .map(read_document)
        .collect::<Result<Vec<_>>>()?;
    let layers: Vec<&str> = layers.iter().map(String::as_str).collect();
    ImportConfig::parse_layered(&layers)
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_import_config".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

/// Task identifier derived from a location when none is given.
#[must_use]
pub fn default_task_id(prefix: &str, location: &str) -> String {
    format!("{prefix}-{}", location.trim())
}

/// Renders an invocation result for the terminal.
#[must_use]
pub fn render_result(result: &InvocationResult) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    for message in &result.messages {
        let _ = writeln!(out, "{message}");
    }
    let _ = write!(
        out,
        "{}: {} of {} records ({})",
        result.state, result.records_processed, result.max_records, result.summary
    );
    out
}

/// Path of a settings file given on the command line, if any.
#[must_use]
pub fn settings_path(arg: Option<&str>) -> Option<PathBuf> {
    arg.map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, OutcomeSummary, Severity, TaskState};
    use tempfile::TempDir;

    #[test]
    fn test_load_import_config_layers() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let dataset = dir.path().join("dataset.yaml");
        let source = dir.path().join("source.json");
        std::fs::write(&dataset, "pages:\n  template: book\n  tags: import\n").expect("write");
        std::fs::write(&source, r#"{"pages": {"tags": "merge"}}"#).expect("write");

        let config = load_import_config(Some(&dataset), Some(&source)).expect("config");
        assert_eq!(config.target.template, "book");
        assert!(config.target.tags.contains(crate::config::OperationTag::Merge));
        assert!(!config.target.tags.contains(crate::config::OperationTag::Import));
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_import_config(None, Some(Path::new("/nonexistent/x.yaml")))
            .expect_err("missing file");
        assert!(matches!(err, Error::OperationFailed { .. }));
    }

    #[test]
    fn test_context_rejects_unknown_parent() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let settings = DatasetSettings::new()
            .with_state_dir(dir.path())
            .with_store_path(dir.path().join("store.json"));
        let context = CommandContext::open(settings, None).expect("open");
        assert_eq!(context.parent(None).expect("root"), ROOT_ID);
        assert!(context.parent(Some(99)).is_err());
    }

    #[test]
    fn test_render_result() {
        let result = InvocationResult {
            state: TaskState::Suspended,
            completed: false,
            records_processed: 1,
            max_records: 2,
            summary: OutcomeSummary {
                created: 1,
                ..OutcomeSummary::default()
            },
            messages: vec![Message {
                severity: Severity::Info,
                text: "people.csv: 2 records".to_string(),
            }],
        };
        assert_eq!(
            render_result(&result),
            "INFO: people.csv: 2 records\nsuspended: 1 of 2 records (created=1 updated=0 deleted=0 skipped=0 failed=0)"
        );
    }
}
