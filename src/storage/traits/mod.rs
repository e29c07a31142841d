//! Storage backend traits.

mod content;

pub use content::{ContentStore, escape_selector_value};
