//! Import pipeline.
//!
//! Drives one invocation of an import task: opens the record source,
//! counts it on the first invocation, skips what earlier invocations
//! consumed and then maps, selects and upserts record by record until the
//! source is exhausted, the record limit is hit or the scheduler asks to
//! stop.

use crate::config::{ImportConfig, OperationTags, RunSettings};
use crate::io::{RawRecord, Resource, create_record_source};
use crate::models::{
    EntityId, InvocationResult, OutcomeSummary, SkipReason, TaskState, UpsertOutcome,
};
use crate::scheduler::TaskScheduler;
use crate::services::checkpoint::Checkpoint;
use crate::services::field_mapper::FieldMapper;
use crate::services::journal::Journal;
use crate::services::selector::SelectorBuilder;
use crate::services::upsert::UpsertDriver;
use crate::storage::ContentStore;
use crate::{Error, Result};
use std::time::Instant;
use tracing::instrument;

/// Longest excerpt of a raw record quoted in error lines.
const EXCERPT_CHARS: usize = 200;

/// Imports record sources into a content store, one invocation at a time.
pub struct ImportPipeline<'a, S: ContentStore + ?Sized, T: TaskScheduler + ?Sized> {
    store: &'a S,
    scheduler: &'a T,
    parent: EntityId,
    tags: OperationTags,
    milestone_step: u64,
    check_interval: u64,
}

impl<'a, S: ContentStore + ?Sized, T: TaskScheduler + ?Sized> ImportPipeline<'a, S, T> {
    /// Creates a pipeline importing below `parent`.
    #[must_use]
    pub fn new(store: &'a S, scheduler: &'a T, parent: EntityId) -> Self {
        let run = RunSettings::default();
        Self {
            store,
            scheduler,
            parent,
            tags: OperationTags::new(),
            milestone_step: run.milestone_step,
            check_interval: run.check_interval,
        }
    }

    /// Applies the checkpoint cadence of the run settings.
    #[must_use]
    pub const fn with_settings(mut self, run: &RunSettings) -> Self {
        self.milestone_step = run.milestone_step;
        self.check_interval = run.check_interval;
        self
    }

    /// Sets the number of records between milestone checkpoints.
    #[must_use]
    pub const fn with_milestone_step(mut self, step: u64) -> Self {
        self.milestone_step = step;
        self
    }

    /// Sets the number of records between scheduler checks.
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

    /// Runs one invocation of the task.
    ///
    /// Progress is persisted on every exit path. Record-level problems are
    /// reported in the result's messages and never abort the invocation.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the invocation: an unreadable or
    /// malformed source, a column count mismatch, or a failure to persist
    /// the store or the progress.
    #[instrument(skip(self, config, resource), fields(operation = "import.run", source = %resource.name))]
    pub fn run(
        &self,
        task: &str,
        config: &ImportConfig,
        resource: &Resource,
    ) -> Result<InvocationResult> {
        let start = Instant::now();
        let mut journal = Journal::new();
        let mut summary = OutcomeSummary::default();
        let mut checkpoint =
            Checkpoint::load(self.scheduler, task, self.milestone_step, self.check_interval)?;

        if checkpoint.progress().task_done {
            journal.info(format!("{task}: already completed"));
            return Ok(Self::result(TaskState::Completed, &checkpoint, summary, journal));
        }

        let tags = config.target.tags.union(&self.tags);
        let processed = self.process(
            config,
            resource,
            &tags,
            &mut checkpoint,
            &mut summary,
            &mut journal,
        );

        let state = match processed {
            Ok(state) => state,
            Err(e) => {
                journal.error(format!("{}: {e}", resource.name));
                if let Err(persist) =
                    self.finish(TaskState::Failed, &mut checkpoint, &summary, &mut journal)
                {
                    journal.error(format!("{task}: progress not saved: {persist}"));
                }
                Self::observe(TaskState::Failed, start);
                return Err(e);
            },
        };

        if let Err(e) = self.finish(state, &mut checkpoint, &summary, &mut journal) {
            Self::observe(TaskState::Failed, start);
            return Err(e);
        }
        Self::observe(state, start);
        Ok(Self::result(state, &checkpoint, summary, journal))
    }

    fn process(
        &self,
        config: &ImportConfig,
        resource: &Resource,
        tags: &OperationTags,
        checkpoint: &mut Checkpoint<'_, T>,
        summary: &mut OutcomeSummary,
        journal: &mut Journal,
    ) -> Result<TaskState> {
        let mut source = create_record_source(resource, config)?;

        if checkpoint.is_first_invocation() {
            if let Some(warning) = resource.format_mismatch(config.input.format) {
                journal.warn(warning);
            }
            tracing::debug!(state = %TaskState::Counting, "Counting records");
            let total = source.count()?;
            let max_records = config.input.limit.map_or(total, |limit| total.min(limit));
            checkpoint.set_max_records(max_records);
            journal.info(format!("{}: {total} records", source.name()));
            if max_records == 0 {
                journal.info(format!("{}: input is empty", source.name()));
                return Ok(TaskState::Completed);
            }
        }

        let skip = checkpoint.resume(journal);
        if skip > 0 {
            source.seek_to(skip)?;
        }
        tracing::debug!(state = %TaskState::Running, skip, "Processing records");

        let mapper = FieldMapper::new(config);
        let selectors = SelectorBuilder::new(self.store, self.parent);
        let driver = UpsertDriver::new(self.store, self.parent, &config.target);

        loop {
            if checkpoint.is_complete() {
                return Ok(TaskState::Completed);
            }

            let outcome = match source.next_record() {
                Ok(Some(record)) => {
                    Self::import_record(&record, &mapper, &selectors, &driver, config, tags, journal)
                },
                Ok(None) => return Ok(TaskState::Completed),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    journal.error(e.to_string());
                    UpsertOutcome::Failed(e)
                },
            };

            let outcome = match outcome {
                UpsertOutcome::Failed(e) if e.is_fatal() => return Err(e),
                outcome => outcome,
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
    }

    fn import_record(
        record: &RawRecord,
        mapper: &FieldMapper<'_>,
        selectors: &SelectorBuilder<'_, S>,
        driver: &UpsertDriver<'_, S>,
        config: &ImportConfig,
        tags: &OperationTags,
        journal: &mut Journal,
    ) -> UpsertOutcome {
        if let Some(reason) = mapper.exclusion(record) {
            tracing::debug!(record = record.serial, reason = %reason, "Record excluded");
            return UpsertOutcome::Skipped(SkipReason::Excluded);
        }

        let built = mapper.map(record).and_then(|mut data| {
            let selector = selectors.build(&config.target, &mut data, record.serial, journal)?;
            Ok((data, selector))
        });
        let outcome = match built {
            Ok((data, selector)) => driver.apply(record.serial, &selector, &data, tags, journal),
            Err(e) => UpsertOutcome::Failed(e),
        };

        if let UpsertOutcome::Failed(e) = &outcome {
            if !e.is_fatal() {
                let line = match e {
                    Error::Record { .. } => e.to_string(),
                    _ => format!("record {}: {e}", record.serial),
                };
                journal.error(format!("{line} [{}]", excerpt(&record.text)));
            }
        }
        outcome
    }

    fn finish(
        &self,
        state: TaskState,
        checkpoint: &mut Checkpoint<'_, T>,
        summary: &OutcomeSummary,
        journal: &mut Journal,
    ) -> Result<()> {
        checkpoint.commit(state, self.store)?;

        let progress = checkpoint.progress();
        journal.info(format!(
            "{state}: {} of {} records processed ({summary})",
            progress.records_processed, progress.max_records
        ));
        Ok(())
    }

    fn observe(state: TaskState, start: Instant) {
        metrics::counter!("dataset_invocations_total", "operation" => "import", "state" => state.as_str())
            .increment(1);
        metrics::histogram!("dataset_invocation_duration_ms", "operation" => "import")
            .record(start.elapsed().as_secs_f64() * 1000.0);
    }

    fn result(
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
}

/// Shortens raw record text for log lines.
fn excerpt(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut short: String = flat.chars().take(EXCERPT_CHARS).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldConfig, FieldKind, Severity};
    use crate::scheduler::LocalScheduler;
    use crate::storage::InMemoryContentStore;

    const PEOPLE: &str = "name;city\nAda;London\nLinus;Helsinki\nGrace;Arlington\n";

    fn config() -> ImportConfig {
        ImportConfig::parse(
            r#"{
                "input": {"type": "csv", "delimiter": ";"},
                "fieldmappings": {"title": 0, "city": 1},
                "pages": {"template": "person", "tags": "import"}
            }"#,
        )
        .expect("valid config")
    }

    fn store() -> InMemoryContentStore {
        let store = InMemoryContentStore::new();
        store.define_field("person", FieldConfig::new("city", FieldKind::Text));
        store
    }

    #[test]
    fn test_import_completes_in_one_invocation() {
        let store = store();
        let scheduler = LocalScheduler::unbounded();
        let pipeline = ImportPipeline::new(&store, &scheduler, store.root());
        let resource = Resource::from_bytes("people.csv", PEOPLE);

        let result = pipeline.run("people", &config(), &resource).expect("run");
        assert_eq!(result.state, TaskState::Completed);
        assert!(result.completed);
        assert_eq!(result.summary.created, 3);
        assert_eq!(result.records_processed, 3);
        assert_eq!(store.entity_count(), 3);
        assert!(scheduler.load_progress("people").expect("load").task_done);
    }

    #[test]
    fn test_suspend_and_resume() {
        let store = store();
        let scheduler = LocalScheduler::unbounded();
        let pipeline = ImportPipeline::new(&store, &scheduler, store.root());
        let resource = Resource::from_bytes("people.csv", PEOPLE);

        scheduler.suspend_after(0);
        let first = pipeline.run("people", &config(), &resource).expect("first");
        assert_eq!(first.state, TaskState::Suspended);
        assert_eq!(first.records_processed, 1);
        assert_eq!(scheduler.load_progress("people").expect("load").offset, 1);

        let second = pipeline.run("people", &config(), &resource).expect("second");
        assert_eq!(second.state, TaskState::Completed);
        assert_eq!(second.summary.created, 2);
        assert_eq!(store.entity_count(), 3);
    }

    #[test]
    fn test_record_limit() {
        let store = store();
        let scheduler = LocalScheduler::unbounded();
        let pipeline = ImportPipeline::new(&store, &scheduler, store.root());
        let resource = Resource::from_bytes("people.csv", PEOPLE);
        let mut config = config();
        config.input.limit = Some(2);

        let result = pipeline.run("people", &config, &resource).expect("run");
        assert!(result.completed);
        assert_eq!(result.max_records, 2);
        assert_eq!(store.entity_count(), 2);
    }

    #[test]
    fn test_empty_input_completes() {
        let store = store();
        let scheduler = LocalScheduler::unbounded();
        let pipeline = ImportPipeline::new(&store, &scheduler, store.root());
        let resource = Resource::from_bytes("people.csv", "name;city\n");

        let result = pipeline.run("people", &config(), &resource).expect("run");
        assert!(result.completed);
        assert!(
            result
                .messages_of(Severity::Info)
                .any(|m| m.text.contains("input is empty"))
        );
    }

    #[test]
    fn test_completed_task_is_not_rerun() {
        let store = store();
        let scheduler = LocalScheduler::unbounded();
        let pipeline = ImportPipeline::new(&store, &scheduler, store.root());
        let resource = Resource::from_bytes("people.csv", PEOPLE);

        pipeline.run("people", &config(), &resource).expect("first");
        let again = pipeline.run("people", &config(), &resource).expect("again");
        assert!(again.completed);
        assert_eq!(again.summary.total(), 0);
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(EXCERPT_CHARS + 10);
        assert_eq!(excerpt(&long).chars().count(), EXCERPT_CHARS + 3);
        assert_eq!(excerpt("a\nb"), "a b");
    }
}
