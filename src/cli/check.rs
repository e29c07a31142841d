//! Check CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{CommandContext, load_import_config};
use crate::config::ImportConfig;
use crate::storage::ContentStore;
use crate::{Error, Result};
use clap::Args;
use std::path::PathBuf;

/// Arguments of `dataset check`.
#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Per-source import configuration (JSON or YAML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset-wide configuration the per-source one is layered over.
    #[arg(long)]
    pub dataset_config: Option<PathBuf>,
}

/// Validates an import configuration against the content store.
///
/// Prints the effective configuration.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or maps fields the
/// target kind does not have.
pub fn execute(context: &CommandContext, args: &CheckArgs) -> Result<ImportConfig> {
    let config = load_import_config(args.dataset_config.as_deref(), args.config.as_deref())?;
    println!("{}", describe(&config));

    let unknown = unknown_fields(&context.store, &config)?;
    if !unknown.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "template '{}' has no field(s) {}",
            config.target.template,
            unknown.join(", ")
        )));
    }
    println!("OK");
    Ok(config)
}

/// Mapped or defaulted fields the target kind does not define.
///
/// # Errors
///
/// Returns an error if the store cannot be queried.
pub fn unknown_fields<S: ContentStore + ?Sized>(
    store: &S,
    config: &ImportConfig,
) -> Result<Vec<String>> {
    let mut unknown = Vec::new();
    let fields = config
        .field_mappings
        .keys()
        .chain(config.field_defaults.keys());
    for field in fields {
        if store.field_config(&config.target.template, field)?.is_none()
            && !unknown.contains(field)
        {
            unknown.push(field.clone());
        }
    }
    Ok(unknown)
}

fn describe(config: &ImportConfig) -> String {
    let tags: Vec<&str> = config.target.tags.iter().map(|t| t.as_str()).collect();
    let fields: Vec<&str> = config.field_mappings.keys().map(String::as_str).collect();
    format!(
        "name: {}\ninput: {} (delimiter '{}', header rows {})\nfields: {}\ntemplate: {}\nselector: {}\ntags: {}\nrequired columns: {}",
        config.name,
        config.input.format,
        config.input.delimiter,
        config.input.header,
        fields.join(", "),
        config.target.template,
        config.target.selector.source(),
        if tags.is_empty() { "(none)".to_string() } else { tags.join(", ") },
        config.required_column_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldConfig, FieldKind};
    use crate::storage::InMemoryContentStore;

    #[test]
    fn test_unknown_fields() {
        let store = InMemoryContentStore::new();
        store.define_field("book", FieldConfig::new("isbn", FieldKind::Text));
        let config = ImportConfig::parse(
            "fieldmappings: {title: 0, isbn: 1, shelf: 2}\npages: {template: book}",
        )
        .expect("config");
        assert_eq!(
            unknown_fields(&store, &config).expect("check"),
            vec!["shelf".to_string()]
        );
    }

    #[test]
    fn test_schema_less_kind_accepts_everything() {
        let store = InMemoryContentStore::new();
        let config = ImportConfig::parse("fieldmappings: {title: 0, anything: 1}").expect("config");
        assert!(unknown_fields(&store, &config).expect("check").is_empty());
    }

    #[test]
    fn test_describe_lists_tags() {
        let config = ImportConfig::parse("pages: {tags: [import, merge]}").expect("config");
        let text = describe(&config);
        assert!(text.contains("tags: import, merge"));
        assert!(text.contains("selector: title=@title"));
    }
}
