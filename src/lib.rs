//! # Dataset
//!
//! Resumable, configuration-driven bulk import and purge engine.
//!
//! Dataset reads large tabular (delimited text) or hierarchical (XML element
//! stream) source files, maps every record to a named field set and creates,
//! updates or deletes one entity per record in a content store. Work is
//! checkpointed record by record so a cooperative scheduler can suspend it at
//! any point and resume it later without re-importing or skipping records.
//!
//! ## Features
//!
//! - JSON or YAML import configuration with deep-merged defaults
//! - Streaming CSV and XML record sources with count and seek support
//! - Direct, header-path, glue and explode column projections
//! - Selector templates with `@field` placeholders and reference lookups
//! - Create / merge / overwrite / delete semantics driven by operation tags
//! - Milestone checkpoints and time-budgeted suspension
//!
//! ## Example
//!
//! ```rust,ignore
//! use dataset::config::ImportConfig;
//! use dataset::io::formats::create_record_source;
//! use dataset::scheduler::LocalScheduler;
//! use dataset::services::ImportPipeline;
//! use dataset::storage::InMemoryContentStore;
//!
//! let config = ImportConfig::parse("pages: {tags: import}")?;
//! let store = InMemoryContentStore::new();
//! let scheduler = LocalScheduler::unbounded();
//! let parent = store.root();
//! let pipeline = ImportPipeline::new(&store, &scheduler, parent);
//! let result = pipeline.run("people", &config, &resource)?;
//! assert!(result.completed);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod scheduler;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{DatasetSettings, ImportConfig};
pub use models::{
    EntityId, FieldData, FieldValue, InvocationResult, SkipReason, TaskProgress, TaskState,
    UpsertOutcome,
};
pub use scheduler::{LocalScheduler, TaskScheduler};
pub use services::{ImportPipeline, PurgePipeline};
pub use storage::{ContentStore, InMemoryContentStore};

/// Error type for dataset operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Fatal |
/// |---------|-------------|-------|
/// | `InvalidConfigSection` | Unknown top-level section in an import configuration | yes |
/// | `InvalidConfig` | Unparseable document, invalid column spec, unknown tag | yes |
/// | `Source` | Unreadable file, malformed XML, unresolvable location | yes |
/// | `ColumnCountMismatch` | Short tabular record with `on_column_mismatch: fail` | yes |
/// | `Record` | Missing column or field, encoding error, unresolved reference | no |
/// | `Target` | Entity create/update/delete failure | no |
/// | `OperationFailed` | I/O, serialization or progress persistence failures | yes |
/// | `InvalidInput` | Invalid arguments passed by the caller | yes |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The configuration contains an unknown top-level section.
    ///
    /// Raised when:
    /// - A section name is misspelled (e.g. `fieldmapping` instead of `fieldmappings`)
    /// - A section from an unrelated configuration format is present
    #[error("invalid configuration section '{0}'")]
    InvalidConfigSection(String),

    /// The configuration document is invalid.
    ///
    /// Raised when:
    /// - The document is neither valid JSON nor valid YAML
    /// - A column specifier has an unsupported shape
    /// - An operation tag, input type, delimiter or exclusion pattern is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The record source cannot be read.
    ///
    /// Raised when:
    /// - The input file cannot be opened or read
    /// - The XML stream is malformed
    /// - A `store://` location cannot be resolved
    #[error("source '{source_name}': {message}")]
    Source {
        /// Display name of the source.
        source_name: String,
        /// What went wrong.
        message: String,
    },

    /// A tabular record has fewer columns than the field mappings need.
    ///
    /// Usually indicates a wrong delimiter, so it aborts the whole source.
    #[error(
        "record {record}: expected at least {expected} columns, found {found} (wrong delimiter?)"
    )]
    ColumnCountMismatch {
        /// 1-based record serial.
        record: u64,
        /// Minimum number of columns required by the mappings.
        expected: usize,
        /// Number of columns present.
        found: usize,
    },

    /// A single record could not be processed.
    ///
    /// Raised when:
    /// - A mapped column or path is missing and no default applies
    /// - A required field is absent after mapping
    /// - The record is not valid in the configured encoding
    /// - A required reference cannot be resolved
    /// - A selector placeholder has no value
    #[error("record {record}: {message}")]
    Record {
        /// 1-based record serial.
        record: u64,
        /// What went wrong.
        message: String,
    },

    /// The content store rejected an operation on one entity.
    #[error("target operation '{operation}' failed: {cause}")]
    Target {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur
    /// - Progress or store state cannot be serialized or persisted
    /// - Logging initialization fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Returns `true` if the error must end the invocation.
    ///
    /// Record and target errors are confined to one record; everything else
    /// aborts the file.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Record { .. } | Self::Target { .. })
    }

    /// Builds a [`Error::Record`] for the given record serial.
    pub fn record(record: u64, message: impl Into<String>) -> Self {
        Self::Record {
            record,
            message: message.into(),
        }
    }

    /// Builds a [`Error::Source`] for the given source name.
    pub fn in_source(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Builds a [`Error::Target`] for the given operation.
    pub fn target(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::Target {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for dataset operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfigSection("fieldmapping".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration section 'fieldmapping'"
        );

        let err = Error::record(3, "column 4 not found");
        assert_eq!(err.to_string(), "record 3: column 4 not found");

        let err = Error::ColumnCountMismatch {
            record: 1,
            expected: 3,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "record 1: expected at least 3 columns, found 1 (wrong delimiter?)"
        );

        let err = Error::in_source("people.csv", "unreadable");
        assert_eq!(err.to_string(), "source 'people.csv': unreadable");
    }

    #[test]
    fn test_error_fatality() {
        assert!(Error::InvalidConfig("x".to_string()).is_fatal());
        assert!(Error::in_source("a", "b").is_fatal());
        assert!(
            Error::ColumnCountMismatch {
                record: 1,
                expected: 2,
                found: 1
            }
            .is_fatal()
        );
        assert!(!Error::record(1, "missing").is_fatal());
        assert!(!Error::target("save", "denied").is_fatal());
    }
}
