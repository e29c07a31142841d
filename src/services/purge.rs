//! Purge pipeline.
//!
//! Deletes every entity of the configured kind below the dataset parent,
//! optionally narrowed by the target's purge selector. Purging is
//! resumable like importing: the number of deleted entities is the
//! progress, and the remaining entities are enumerated afresh on every
//! invocation.

use crate::config::{ImportConfig, OperationTag, OperationTags, RunSettings};
use crate::models::{EntityId, InvocationResult, OutcomeSummary, TaskState, UpsertOutcome};
use crate::scheduler::TaskScheduler;
use crate::services::checkpoint::Checkpoint;
use crate::services::journal::Journal;
use crate::storage::ContentStore;
use crate::{Error, Result};
use std::time::Instant;
use tracing::instrument;

/// Deletes the entities of a dataset, one invocation at a time.
pub struct PurgePipeline<'a, S: ContentStore + ?Sized, T: TaskScheduler + ?Sized> {
    store: &'a S,
    scheduler: &'a T,
    parent: EntityId,
    tags: OperationTags,
    milestone_step: u64,
    check_interval: u64,
}

impl<'a, S: ContentStore + ?Sized, T: TaskScheduler + ?Sized> PurgePipeline<'a, S, T> {
    /// Creates a pipeline purging below `parent`.
    #[must_use]
    pub fn new(store: &'a S, scheduler: &'a T, parent: EntityId) -> Self {
        let run = RunSettings::default();
        Self {
            store,
            scheduler,
            parent,
            tags: OperationTags::new(),
            milestone_step: run.milestone_step,
            check_interval: run.purge_check_interval,
        }
    }

    /// Applies the checkpoint cadence of the run settings.
    #[must_use]
    pub const fn with_settings(mut self, run: &RunSettings) -> Self {
        self.milestone_step = run.milestone_step;
        self.check_interval = run.purge_check_interval;
        self
    }

    /// Sets the number of deletions between scheduler checks.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: u64) -> Self {
        self.check_interval = interval;
        self
    }

    /// Adds invocation tags to the tags of the configuration.
    #[must_use]
    pub fn with_tags(mut self, tags: OperationTags) -> Self {
        self.tags = tags;
        self
    }

    /// The selector matching the entities to purge.
    #[must_use]
    pub fn selector(&self, config: &ImportConfig) -> String {
        let mut selector = format!(
            "parent={}, template={}",
            self.parent,
            self.store.escape_value(&config.target.template)
        );
        if let Some(extra) = config.target.purge_selector.as_deref() {
            selector.push_str(", ");
            selector.push_str(extra);
        }
        selector
    }

    /// Runs one invocation of the purge task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the `purge` tag is not set, and
    /// store or progress persistence failures.
    #[instrument(skip(self, config), fields(operation = "purge.run"))]
    pub fn run(&self, task: &str, config: &ImportConfig) -> Result<InvocationResult> {
        let tags = config.target.tags.union(&self.tags);
        if !tags.contains(OperationTag::Purge) {
            return Err(Error::InvalidConfig(
                "purging requires the 'purge' tag".to_string(),
            ));
        }

        let start = Instant::now();
        let mut journal = Journal::new();
        let mut summary = OutcomeSummary::default();
        let mut checkpoint =
            Checkpoint::load(self.scheduler, task, self.milestone_step, self.check_interval)?;

        if checkpoint.progress().task_done {
            journal.info(format!("{task}: already completed"));
            return Ok(result(TaskState::Completed, &checkpoint, summary, journal));
        }

        let state = match self.purge(config, &mut checkpoint, &mut summary, &mut journal) {
            Ok(state) => state,
            Err(e) => {
                journal.error(format!("{task}: {e}"));
                if let Err(persist) = checkpoint.commit(TaskState::Failed, self.store) {
                    journal.error(format!("{task}: progress not saved: {persist}"));
                }
                observe(TaskState::Failed, start);
                return Err(e);
            },
        };

        if let Err(e) = checkpoint.commit(state, self.store) {
            journal.error(format!("{task}: progress not saved: {e}"));
            observe(TaskState::Failed, start);
            return Err(e);
        }
        let progress = checkpoint.progress();
        journal.info(format!(
            "{state}: {} of {} entities purged ({summary})",
            summary.deleted, progress.max_records
        ));
        observe(state, start);
        Ok(result(state, &checkpoint, summary, journal))
    }

    fn purge(
        &self,
        config: &ImportConfig,
        checkpoint: &mut Checkpoint<'_, T>,
        summary: &mut OutcomeSummary,
        journal: &mut Journal,
    ) -> Result<TaskState> {
        let selector = self.selector(config);

        if checkpoint.is_first_invocation() {
            let total = self.store.count(&selector)?;
            checkpoint.set_max_records(total);
            if total == 0 {
                journal.info("Nothing to purge");
                return Ok(TaskState::Completed);
            }
            journal.info(format!("{total} entities to purge"));
        }
        checkpoint.resume(journal);

        for id in self.store.find_many(&selector)? {
            if checkpoint.is_complete() {
                break;
            }
            let outcome = match self.store.delete(id, true) {
                Ok(()) => UpsertOutcome::Deleted(id),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    journal.error(format!("entity {id}: {e}"));
                    UpsertOutcome::Failed(e)
                },
            };
            summary.record(&outcome);
            metrics::counter!("dataset_records_total", "outcome" => outcome.label()).increment(1);
            checkpoint.consume();

            if checkpoint.at_milestone() {
                self.store.flush()?;
                checkpoint.save_milestone(journal)?;
            }
            if !checkpoint.is_complete() && checkpoint.should_suspend() {
                return Ok(TaskState::Suspended);
            }
        }
        Ok(TaskState::Completed)
    }
}

fn observe(state: TaskState, start: Instant) {
    metrics::counter!("dataset_invocations_total", "operation" => "purge", "state" => state.as_str())
        .increment(1);
    metrics::histogram!("dataset_invocation_duration_ms", "operation" => "purge")
        .record(start.elapsed().as_secs_f64() * 1000.0);
}

fn result<T: TaskScheduler + ?Sized>(
    state: TaskState,
    checkpoint: &Checkpoint<'_, T>,
    summary: OutcomeSummary,
    journal: Journal,
) -> InvocationResult {
    let progress = checkpoint.progress();
    InvocationResult {
        state,
        completed: state == TaskState::Completed,
        records_processed: progress.records_processed,
        max_records: progress.max_records,
        summary,
        messages: journal.into_messages(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::LocalScheduler;
    use crate::storage::InMemoryContentStore;

    fn config(tags: &str) -> ImportConfig {
        ImportConfig::parse(&format!(
            r#"{{"pages": {{"template": "person", "tags": "{tags}"}}}}"#
        ))
        .expect("valid config")
    }

    fn seeded(n: usize) -> InMemoryContentStore {
        let store = InMemoryContentStore::new();
        for i in 0..n {
            let title = format!("p{i}");
            store
                .insert_entity(store.root(), "person", &[("title", title.as_str())])
                .expect("insert");
        }
        store
            .insert_entity(store.root(), "city", &[("title", "London")])
            .expect("insert");
        store
    }

    #[test]
    fn test_purge_requires_tag() {
        let store = seeded(1);
        let scheduler = LocalScheduler::unbounded();
        let pipeline = PurgePipeline::new(&store, &scheduler, store.root());
        let err = pipeline.run("purge", &config("import")).expect_err("no purge tag");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_purge_deletes_only_the_template() {
        let store = seeded(3);
        let scheduler = LocalScheduler::unbounded();
        let pipeline = PurgePipeline::new(&store, &scheduler, store.root());

        let result = pipeline.run("purge", &config("purge")).expect("run");
        assert!(result.completed);
        assert_eq!(result.summary.deleted, 3);
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_purge_suspends_and_resumes() {
        let store = seeded(5);
        let scheduler = LocalScheduler::unbounded();
        let pipeline =
            PurgePipeline::new(&store, &scheduler, store.root()).with_check_interval(2);

        scheduler.suspend_after(0);
        let first = pipeline.run("purge", &config("purge")).expect("first");
        assert_eq!(first.state, TaskState::Suspended);
        assert_eq!(first.summary.deleted, 2);

        let second = pipeline.run("purge", &config("purge")).expect("second");
        assert!(second.completed);
        assert_eq!(second.summary.deleted, 3);
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_nothing_to_purge() {
        let store = seeded(0);
        let scheduler = LocalScheduler::unbounded();
        let pipeline = PurgePipeline::new(&store, &scheduler, store.root());
        let result = pipeline.run("purge", &config("purge")).expect("run");
        assert!(result.completed);
        assert_eq!(result.messages[0].text, "Nothing to purge");
    }
}
