//! Data models for dataset.
//!
//! Shared types that flow between the record sources, the mapping and
//! selector services, the content store and the checkpoint controller.

mod entity;
mod field;
mod outcome;
mod progress;

pub use entity::EntityId;
pub use field::{
    FieldConfig, FieldData, FieldKind, FieldValue, ReferenceConfig, SelectOption,
    DEFAULT_DATE_FORMAT,
};
pub use outcome::{InvocationResult, Message, OutcomeSummary, Severity, SkipReason, UpsertOutcome};
pub use progress::{TaskProgress, TaskState};
