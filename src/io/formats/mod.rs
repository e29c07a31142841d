//! Record source format adapters.
//!
//! Each format implements [`RecordSource`].

pub mod hierarchical;
pub mod tabular;

pub use hierarchical::HierarchicalSource;
pub use tabular::{TabularOptions, TabularSource};

use super::locator::Resource;
use super::traits::RecordSource;
use crate::Result;
use crate::config::{ImportConfig, InputFormat};

/// Creates the record source the configuration asks for.
///
/// # Errors
///
/// Returns an error if the reader options are invalid.
pub fn create_record_source(
    resource: &Resource,
    config: &ImportConfig,
) -> Result<Box<dyn RecordSource>> {
    match config.input.format {
        InputFormat::Tabular => Ok(Box::new(TabularSource::new(
            resource,
            TabularOptions::from_config(config)?,
        ))),
        InputFormat::Hierarchical => Ok(Box::new(HierarchicalSource::new(
            resource,
            config.input.record_element(),
        ))),
    }
}
