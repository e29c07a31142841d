//! Per-record outcomes and per-invocation results.

use super::{EntityId, TaskState};
use crate::Error;
use serde::Serialize;
use std::fmt;

/// Why a record was skipped without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No entity matched and the `import` tag is absent.
    NoMatch,
    /// An entity matched but neither `merge` nor `overwrite` is set.
    ExistsNoMerge,
    /// The record matched an exclusion rule.
    Excluded,
}

impl SkipReason {
    /// Returns the reason as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatch => "no match, import tag absent",
            Self::ExistsNoMerge => "entity exists, merge tag absent",
            Self::Excluded => "excluded by input filter",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of applying one record to the content store.
#[derive(Debug)]
pub enum UpsertOutcome {
    /// A new entity was created.
    Created(EntityId),
    /// An existing entity was updated.
    Updated(EntityId),
    /// A matching entity was deleted.
    Deleted(EntityId),
    /// The record was skipped.
    Skipped(SkipReason),
    /// The record failed; the error is confined to this record.
    Failed(Error),
}

impl UpsertOutcome {
    /// Returns the outcome label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    /// Returns the affected entity, if any.
    #[must_use]
    pub const fn entity(&self) -> Option<EntityId> {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Deleted(id) => Some(*id),
            Self::Skipped(_) | Self::Failed(_) => None,
        }
    }
}

/// Severity of an invocation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Progress information.
    Info,
    /// A record was skipped or modified.
    Warning,
    /// A record or the invocation failed.
    Error,
}

/// A message reported to the scheduler's UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Severity.
    pub severity: Severity,
    /// Message text.
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{prefix}: {}", self.text)
    }
}

/// Counts of record outcomes within one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    /// Entities created.
    pub created: u64,
    /// Entities updated.
    pub updated: u64,
    /// Entities deleted.
    pub deleted: u64,
    /// Records skipped (including excluded ones).
    pub skipped: u64,
    /// Records failed.
    pub failed: u64,
}

impl OutcomeSummary {
    /// Counts one outcome.
    pub const fn record(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created(_) => self.created += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Deleted(_) => self.deleted += 1,
            UpsertOutcome::Skipped(_) => self.skipped += 1,
            UpsertOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Total records counted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.created + self.updated + self.deleted + self.skipped + self.failed
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} skipped={} failed={}",
            self.created, self.updated, self.deleted, self.skipped, self.failed
        )
    }
}

/// Result of one import or purge invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    /// Final state of the invocation.
    pub state: TaskState,
    /// `true` when the task is done and must not be invoked again.
    pub completed: bool,
    /// Records consumed so far, across invocations.
    pub records_processed: u64,
    /// Total records of the task.
    pub max_records: u64,
    /// Outcome counts of this invocation.
    pub summary: OutcomeSummary,
    /// Info, warning and error lines in emission order.
    pub messages: Vec<Message>,
}

impl InvocationResult {
    /// Returns the messages of the given severity.
    pub fn messages_of(&self, severity: Severity) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    /// Number of warnings emitted.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.messages_of(Severity::Warning).count()
    }
}
