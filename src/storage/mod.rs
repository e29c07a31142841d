//! Content store abstraction.
//!
//! The import engine talks to the target system only through the
//! [`ContentStore`] trait. Two implementations ship with the crate:
//!
//! - [`InMemoryContentStore`]: non-persistent, used by tests and dry runs
//! - [`JsonFileContentStore`]: the in-memory store persisted to a JSON file

// Allow significant_drop_tightening - lock guards are held for whole lookups.
#![allow(clippy::significant_drop_tightening)]

pub mod filesystem;
pub mod memory;
pub mod query;
pub mod traits;

pub use filesystem::JsonFileContentStore;
pub use memory::{InMemoryContentStore, ROOT_ID, StoreSnapshot, StoredEntity};
pub use query::{Candidate, Query};
pub use traits::{ContentStore, escape_selector_value};
