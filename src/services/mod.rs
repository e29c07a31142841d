//! Business logic services.
//!
//! Services turn raw records into store operations: the field mapper
//! projects records onto field sets, the selector builder finds their
//! entities, the upsert driver applies them, and the pipelines tie the
//! steps to the checkpoint controller.

pub mod checkpoint;
pub mod field_mapper;
mod import;
pub mod journal;
mod purge;
pub mod selector;
pub mod upsert;

pub use checkpoint::Checkpoint;
pub use field_mapper::{FieldMapper, MAX_SELECTOR_VALUE_CHARS};
pub use import::ImportPipeline;
pub use journal::Journal;
pub use purge::PurgePipeline;
pub use selector::{BuiltSelector, SelectorBuilder, SelectorTemplate};
pub use upsert::{UpsertDriver, convert_value};
