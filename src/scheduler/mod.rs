//! Cooperative task scheduling.
//!
//! Long imports run as a sequence of invocations. The scheduler owns the
//! persisted [`TaskProgress`] of every task and decides, between records,
//! whether the current invocation may go on.

mod local;

pub use local::LocalScheduler;

use crate::Result;
use crate::models::TaskProgress;

/// Contract between the pipelines and the scheduler that runs them.
pub trait TaskScheduler {
    /// Loads the persisted progress of a task, or fresh progress if none.
    ///
    /// # Errors
    ///
    /// Returns an error if stored progress exists but cannot be read.
    fn load_progress(&self, task: &str) -> Result<TaskProgress>;

    /// Returns `false` once the invocation has used up its budget.
    fn allowed_to_execute(&self, task: &str) -> bool;

    /// Returns `false` once the task was cancelled.
    fn is_active(&self, task: &str) -> bool;

    /// Persists progress at a milestone.
    ///
    /// Returns `true` if the milestone was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the progress cannot be persisted.
    fn save_progress_at_milestone(&self, task: &str, progress: &TaskProgress) -> Result<bool>;

    /// Persists progress at the end of an invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the progress cannot be persisted.
    fn save_progress(&self, task: &str, progress: &TaskProgress) -> Result<()>;
}
