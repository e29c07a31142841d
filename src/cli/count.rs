//! Count CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{CommandContext, load_import_config};
use crate::io::{ResourceLocator, create_record_source};
use crate::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments of `dataset count`.
#[derive(Debug, Clone, Args)]
pub struct CountArgs {
    /// Source location: a path, `file://<path>` or `store://<id>/<file>`.
    pub location: String,

    /// Import configuration describing the source format.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset-wide configuration the per-source one is layered over.
    #[arg(long)]
    pub dataset_config: Option<PathBuf>,
}

/// Counts the records of a source without importing them.
///
/// # Errors
///
/// Returns an error if the configuration or the source is invalid.
pub fn execute(context: &CommandContext, args: &CountArgs) -> Result<u64> {
    let config = load_import_config(args.dataset_config.as_deref(), args.config.as_deref())?;
    let resource = ResourceLocator::new(&context.settings.source_field)
        .with_store(&context.store)
        .resolve(&args.location)?;
    if let Some(warning) = resource.format_mismatch(config.input.format) {
        tracing::warn!("{warning}");
    }

    let mut source = create_record_source(&resource, &config)?;
    let total = source.count()?;
    println!("{}: {total} records", source.name());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetSettings;
    use tempfile::TempDir;

    #[test]
    fn test_count_xml_records() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = dir.path().join("books.xml");
        let config = dir.path().join("books.yaml");
        std::fs::write(
            &source,
            "<shelf><book><title>A</title></book><book><title>B</title></book></shelf>",
        )
        .expect("write");
        std::fs::write(&config, "input:\n  type: xml\n  delimiter: book\n").expect("write");
        let settings = DatasetSettings::new()
            .with_state_dir(dir.path())
            .with_store_path(dir.path().join("store.json"));
        let context = CommandContext::open(settings, None).expect("open");

        let args = CountArgs {
            location: source.display().to_string(),
            config: Some(config),
            dataset_config: None,
        };
        assert_eq!(execute(&context, &args).expect("count"), 2);
    }
}
