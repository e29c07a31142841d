//! Checkpoint and resume bookkeeping.
//!
//! Wraps the [`TaskProgress`] of one invocation: counts consumed records,
//! persists progress at milestones and asks the scheduler, between
//! records, whether the invocation may continue.

use crate::Result;
use crate::models::{TaskProgress, TaskState};
use crate::scheduler::TaskScheduler;
use crate::services::journal::Journal;
use crate::storage::ContentStore;

/// Progress controller of one invocation.
pub struct Checkpoint<'a, T: TaskScheduler + ?Sized> {
    scheduler: &'a T,
    task: String,
    progress: TaskProgress,
    milestone_step: u64,
    check_interval: u64,
    since_check: u64,
    previous_milestone: u64,
}

impl<'a, T: TaskScheduler + ?Sized> Checkpoint<'a, T> {
    /// Loads the task's progress from the scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored progress cannot be read.
    pub fn load(
        scheduler: &'a T,
        task: &str,
        milestone_step: u64,
        check_interval: u64,
    ) -> Result<Self> {
        let progress = scheduler.load_progress(task)?;
        Ok(Self {
            scheduler,
            task: task.to_string(),
            progress,
            milestone_step: milestone_step.max(1),
            check_interval: check_interval.max(1),
            since_check: 0,
            previous_milestone: progress.records_processed,
        })
    }

    /// Current progress.
    #[must_use]
    pub const fn progress(&self) -> &TaskProgress {
        &self.progress
    }

    /// Returns `true` if no record was consumed in earlier invocations.
    #[must_use]
    pub const fn is_first_invocation(&self) -> bool {
        self.progress.is_first_invocation()
    }

    /// Records the total number of records.
    pub const fn set_max_records(&mut self, max_records: u64) {
        self.progress.max_records = max_records;
    }

    /// Consumes the suspend marker and returns the records to skip.
    ///
    /// `records_processed` wins when the marker disagrees with it.
    pub fn resume(&mut self, journal: &mut Journal) -> u64 {
        let offset = self.progress.offset;
        if offset > 0 {
            if offset != self.progress.records_processed {
                journal.warn(format!(
                    "resume marker {offset} differs from {} processed records, continuing after record {}",
                    self.progress.records_processed, self.progress.records_processed
                ));
            }
            self.progress.offset = 0;
        }
        self.progress.milestone = self.progress.records_processed + self.milestone_step;
        self.previous_milestone = self.progress.records_processed;
        if self.progress.records_processed > 0 {
            journal.info(format!(
                "resuming after {} of {} records",
                self.progress.records_processed, self.progress.max_records
            ));
        }
        self.progress.records_processed
    }

    /// Returns `true` once every counted record has been consumed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress.all_records_processed()
    }

    /// Counts one consumed record.
    pub const fn consume(&mut self) {
        self.progress.records_processed += 1;
    }

    /// Returns `true` when the milestone has been reached.
    #[must_use]
    pub const fn at_milestone(&self) -> bool {
        self.progress.records_processed >= self.progress.milestone
    }

    /// Persists progress at the milestone and advances it when recorded.
    ///
    /// The caller flushes the content store first.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot persist the progress.
    pub fn save_milestone(&mut self, journal: &mut Journal) -> Result<()> {
        if self
            .scheduler
            .save_progress_at_milestone(&self.task, &self.progress)?
        {
            let since = self.progress.records_processed - self.previous_milestone;
            self.previous_milestone = self.progress.records_processed;
            self.progress.milestone = self.progress.records_processed + self.milestone_step;
            metrics::counter!("dataset_milestones_total").increment(1);
            journal.info(format!(
                "milestone: {} records since last milestone, {} of {} done",
                since, self.progress.records_processed, self.progress.max_records
            ));
        }
        Ok(())
    }

    /// Asks the scheduler whether to stop, every `check_interval` records.
    pub fn should_suspend(&mut self) -> bool {
        self.since_check += 1;
        if self.since_check < self.check_interval {
            return false;
        }
        self.since_check = 0;
        !(self.scheduler.is_active(&self.task) && self.scheduler.allowed_to_execute(&self.task))
    }

    /// Marks the invocation as suspended.
    pub const fn suspend(&mut self) {
        self.progress.offset = self.progress.records_processed;
        self.progress.task_done = false;
    }

    /// Marks the task as completed.
    pub const fn complete(&mut self) {
        self.progress.offset = 0;
        self.progress.task_done = true;
    }

    /// Marks the invocation as failed; no resume marker is left behind.
    pub const fn fail(&mut self) {
        self.progress.offset = 0;
        self.progress.task_done = false;
    }

    /// Persists progress at the end of the invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot persist the progress.
    pub fn save(&self) -> Result<()> {
        self.scheduler.save_progress(&self.task, &self.progress)
    }

    /// Flushes the store, then records the final state and saves progress.
    ///
    /// Progress only advances past records the store made durable: when the
    /// flush fails nothing is saved and the last milestone stays in effect.
    ///
    /// # Errors
    ///
    /// Returns the flush error, or an error if the scheduler cannot persist
    /// the progress.
    pub fn commit<S: ContentStore + ?Sized>(&mut self, state: TaskState, store: &S) -> Result<()> {
        store.flush()?;
        match state {
            TaskState::Completed => self.complete(),
            TaskState::Failed => self.fail(),
            _ => self.suspend(),
        }
        self.save()
    }
}
