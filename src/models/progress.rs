//! Task progress and lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of one import or purge task, persisted between invocations.
///
/// `records_processed` is the single source of truth for resumption: the
/// next invocation skips exactly that many records. `offset` is only a
/// suspend marker and is reset to 0 as soon as it has been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Records consumed so far (imported, skipped, excluded or failed).
    #[serde(default)]
    pub records_processed: u64,
    /// Total records, known after the first count.
    #[serde(default)]
    pub max_records: u64,
    /// Record position at the last suspend, 0 otherwise.
    #[serde(default)]
    pub offset: u64,
    /// `records_processed` value at which progress is persisted next.
    #[serde(default)]
    pub milestone: u64,
    /// Set once the task has completed.
    #[serde(default)]
    pub task_done: bool,
}

impl TaskProgress {
    /// Creates fresh progress for a task that has not started.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records_processed: 0,
            max_records: 0,
            offset: 0,
            milestone: 0,
            task_done: false,
        }
    }

    /// Returns `true` if no record has been consumed yet.
    #[must_use]
    pub const fn is_first_invocation(&self) -> bool {
        self.records_processed == 0
    }

    /// Returns `true` once every counted record has been consumed.
    #[must_use]
    pub const fn all_records_processed(&self) -> bool {
        self.max_records > 0 && self.records_processed >= self.max_records
    }

    /// Completion ratio in percent, if the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> Option<f32> {
        if self.max_records == 0 {
            return None;
        }
        Some((self.records_processed as f32 / self.max_records as f32) * 100.0)
    }
}

/// Lifecycle state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Nothing has run yet.
    NotStarted,
    /// Counting records on the first invocation.
    Counting,
    /// Processing records.
    Running,
    /// Stopped cooperatively; a later invocation resumes.
    Suspended,
    /// All records consumed or the record limit reached.
    Completed,
    /// Stopped by a fatal error.
    Failed,
}

impl TaskState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Counting => "counting",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for states that end an invocation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Suspended | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_defaults_from_partial_json() {
        let progress: TaskProgress =
            serde_json::from_str(r#"{"records_processed": 5}"#).unwrap_or_default();
        assert_eq!(progress.records_processed, 5);
        assert_eq!(progress.max_records, 0);
        assert!(!progress.task_done);
    }

    #[test]
    fn test_all_records_processed() {
        let mut progress = TaskProgress::new();
        assert!(!progress.all_records_processed());
        progress.max_records = 2;
        progress.records_processed = 2;
        assert!(progress.all_records_processed());
        assert_eq!(progress.percent_complete(), Some(100.0));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Suspended.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert_eq!(TaskState::Counting.to_string(), "counting");
    }
}
