//! Record source I/O subsystem.
//!
//! Streams raw records out of large source files with support for two
//! formats and resumable positioning.
//!
//! # Architecture
//!
//! - **Locator** resolves a location string to a readable [`Resource`]
//! - **Format adapters** implement the [`RecordSource`] trait
//! - The import pipeline counts, seeks and pulls records through the trait
//!
//! # Supported Formats
//!
//! | Format | Config `type` | Record |
//! |--------|---------------|--------|
//! | Delimited text | `csv`, `tsv`, `tabular` | one row after the header rows |
//! | XML | `xml`, `hierarchical` | one repeating element, named by `delimiter` |
//!
//! # Example
//!
//! ```rust,ignore
//! use dataset::io::{ResourceLocator, create_record_source};
//!
//! let resource = ResourceLocator::new("dataset_source_files").resolve("people.csv")?;
//! let mut source = create_record_source(&resource, &config)?;
//! while let Some(record) = source.next_record()? {
//!     println!("{}: {}", record.serial, record.text);
//! }
//! ```

pub mod formats;
pub mod locator;
pub mod traits;

pub use formats::{HierarchicalSource, TabularOptions, TabularSource, create_record_source};
pub use locator::{Resource, ResourceLocator, SourceInput};
pub use traits::{RawRecord, RecordBody, RecordSource, XmlElement, XmlNode};
