//! Local scheduler.
//!
//! Runs tasks in the current process. An invocation is allowed to execute
//! until its wall-clock budget is spent or the shared active flag is
//! cleared (the CLI clears it on Ctrl-C). Progress is kept in memory and,
//! when a state directory is configured, in one JSON file per task.

use super::TaskScheduler;
use crate::models::TaskProgress;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Scheduler for a single local process.
#[derive(Debug)]
pub struct LocalScheduler {
    state_dir: Option<PathBuf>,
    deadline: Option<Instant>,
    active: Arc<AtomicBool>,
    progress: Mutex<HashMap<String, TaskProgress>>,
    /// Remaining continue checks before the next forced suspension.
    suspend_after: Mutex<Option<u64>>,
}

impl LocalScheduler {
    /// Creates a scheduler persisting progress below `state_dir`.
    ///
    /// `budget` bounds the wall-clock time of the invocation.
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>, budget: Option<Duration>) -> Self {
        Self {
            state_dir: Some(state_dir.into()),
            ..Self::with_budget(budget)
        }
    }

    /// Creates an in-memory scheduler without a budget.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_budget(None)
    }

    /// Creates an in-memory scheduler with an optional budget.
    #[must_use]
    pub fn with_budget(budget: Option<Duration>) -> Self {
        Self {
            state_dir: None,
            deadline: budget.map(|b| Instant::now() + b),
            active: Arc::new(AtomicBool::new(true)),
            progress: Mutex::new(HashMap::new()),
            suspend_after: Mutex::new(None),
        }
    }

    /// The flag that keeps tasks active; store `false` to cancel them.
    #[must_use]
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Cancels all tasks.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Refuses the continue check after `checks` more granted checks.
    ///
    /// The refusal is one-shot, so the next invocation runs normally.
    pub fn suspend_after(&self, checks: u64) {
        if let Ok(mut remaining) = self.suspend_after.lock() {
            *remaining = Some(checks);
        }
    }

    /// Forgets the stored progress of a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the progress file cannot be removed.
    pub fn reset(&self, task: &str) -> Result<()> {
        self.progress
            .lock()
            .map_err(|_| Error::OperationFailed {
                operation: "reset_progress".to_string(),
                cause: "Lock poisoned".to_string(),
            })?
            .remove(task);
        if let Some(path) = self.progress_path(task) {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| Error::OperationFailed {
                    operation: "remove_progress_file".to_string(),
                    cause: format!("{}: {e}", path.display()),
                })?;
            }
        }
        Ok(())
    }

    fn progress_path(&self, task: &str) -> Option<PathBuf> {
        let file: String = task
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.state_dir
            .as_deref()
            .map(|dir| dir.join(format!("{file}.progress.json")))
    }

    fn write_file(path: &Path, progress: &TaskProgress) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::OperationFailed {
                operation: "create_state_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let json = serde_json::to_string_pretty(progress).map_err(|e| Error::OperationFailed {
            operation: "serialize_progress".to_string(),
            cause: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Error::OperationFailed {
            operation: "write_progress_file".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp, path).map_err(|e| Error::OperationFailed {
            operation: "rename_progress_file".to_string(),
            cause: e.to_string(),
        })
    }

    fn store(&self, task: &str, progress: &TaskProgress) -> Result<()> {
        self.progress
            .lock()
            .map_err(|_| Error::OperationFailed {
                operation: "save_progress".to_string(),
                cause: "Lock poisoned".to_string(),
            })?
            .insert(task.to_string(), *progress);
        match self.progress_path(task) {
            Some(path) => Self::write_file(&path, progress),
            None => Ok(()),
        }
    }
}

impl TaskScheduler for LocalScheduler {
    fn load_progress(&self, task: &str) -> Result<TaskProgress> {
        if let Some(path) = self.progress_path(task).filter(|p| p.exists()) {
            let raw = fs::read_to_string(&path).map_err(|e| Error::OperationFailed {
                operation: "read_progress_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
            return serde_json::from_str(&raw).map_err(|e| Error::OperationFailed {
                operation: "parse_progress_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            });
        }
        let progress = self.progress.lock().map_err(|_| Error::OperationFailed {
            operation: "load_progress".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;
        Ok(progress.get(task).copied().unwrap_or_default())
    }

    fn allowed_to_execute(&self, task: &str) -> bool {
        if let Ok(mut remaining) = self.suspend_after.lock() {
            match *remaining {
                Some(0) => {
                    *remaining = None;
                    tracing::debug!(task, "Forced suspension");
                    return false;
                },
                Some(n) => *remaining = Some(n - 1),
                None => {},
            }
        }
        self.deadline.is_none_or(|deadline| Instant::now() < deadline)
    }

    fn is_active(&self, _task: &str) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn save_progress_at_milestone(&self, task: &str, progress: &TaskProgress) -> Result<bool> {
        self.store(task, progress)?;
        Ok(true)
    }

    fn save_progress(&self, task: &str, progress: &TaskProgress) -> Result<()> {
        self.store(task, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_roundtrip_in_memory() {
        let scheduler = LocalScheduler::unbounded();
        assert_eq!(scheduler.load_progress("t").expect("load"), TaskProgress::new());

        let progress = TaskProgress {
            records_processed: 3,
            max_records: 10,
            ..TaskProgress::new()
        };
        scheduler.save_progress("t", &progress).expect("save");
        assert_eq!(scheduler.load_progress("t").expect("load"), progress);
        scheduler.reset("t").expect("reset");
        assert_eq!(scheduler.load_progress("t").expect("load"), TaskProgress::new());
    }

    #[test]
    fn test_progress_survives_restart() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let progress = TaskProgress {
            records_processed: 5,
            max_records: 9,
            offset: 5,
            ..TaskProgress::new()
        };
        LocalScheduler::new(dir.path(), None)
            .save_progress("books/2024.csv", &progress)
            .expect("save");

        let reloaded = LocalScheduler::new(dir.path(), None)
            .load_progress("books/2024.csv")
            .expect("load");
        assert_eq!(reloaded, progress);
        assert!(dir.path().join("books_2024.csv.progress.json").exists());
    }

    #[test]
    fn test_forced_suspension_is_one_shot() {
        let scheduler = LocalScheduler::unbounded();
        scheduler.suspend_after(1);
        assert!(scheduler.allowed_to_execute("t"));
        assert!(!scheduler.allowed_to_execute("t"));
        assert!(scheduler.allowed_to_execute("t"));
    }

    #[test]
    fn test_budget_and_cancellation() {
        let scheduler = LocalScheduler::with_budget(Some(Duration::ZERO));
        assert!(!scheduler.allowed_to_execute("t"));

        let scheduler = LocalScheduler::unbounded();
        assert!(scheduler.is_active("t"));
        scheduler.active_flag().store(false, Ordering::Release);
        assert!(!scheduler.is_active("t"));
    }
}
