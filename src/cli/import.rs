//! Import CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{CommandContext, default_task_id, load_import_config, render_result};
use crate::config::OperationTags;
use crate::io::ResourceLocator;
use crate::models::InvocationResult;
use crate::services::ImportPipeline;
use crate::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments of `dataset import`.
#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Source location: a path, `file://<path>` or `store://<id>/<file>`.
    pub location: String,

    /// Per-source import configuration (JSON or YAML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset-wide configuration the per-source one is layered over.
    #[arg(long)]
    pub dataset_config: Option<PathBuf>,

    /// Entity the dataset lives under.
    #[arg(short, long)]
    pub parent: Option<u64>,

    /// Extra operation tags (comma-separated).
    #[arg(short, long)]
    pub tags: Option<String>,

    /// Task identifier; defaults to one derived from the location.
    #[arg(long)]
    pub task: Option<String>,

    /// Wall-clock budget of this invocation in seconds.
    #[arg(long, env = "DATASET_TIME_BUDGET_SECS")]
    pub time_budget: Option<u64>,

    /// Records between progress checkpoints.
    #[arg(long)]
    pub milestone: Option<u64>,

    /// Forget earlier progress and start from the first record.
    #[arg(long)]
    pub restart: bool,
}

/// Runs one import invocation and prints its result.
///
/// # Errors
///
/// Returns an error if the configuration, the location or the source is
/// invalid, or if the invocation failed.
pub fn execute(context: &CommandContext, args: &ImportArgs) -> Result<InvocationResult> {
    let config = load_import_config(args.dataset_config.as_deref(), args.config.as_deref())?;
    let parent = context.parent(args.parent)?;
    let tags = match args.tags.as_deref() {
        Some(list) => OperationTags::parse(list)?,
        None => OperationTags::new(),
    };

    let location = config.input.location.as_deref().unwrap_or(&args.location);
    let resource = ResourceLocator::new(&context.settings.source_field)
        .with_store(&context.store)
        .resolve(location)?;

    let task = args
        .task
        .clone()
        .unwrap_or_else(|| default_task_id("import", location));
    if args.restart {
        context.scheduler.reset(&task)?;
    }

    let mut run = context.settings.run.clone();
    if let Some(step) = args.milestone.filter(|s| *s > 0) {
        run.milestone_step = step;
    }
    let pipeline = ImportPipeline::new(&context.store, &context.scheduler, parent)
        .with_settings(&run)
        .with_tags(tags);

    let result = pipeline.run(&task, &config, &resource)?;
    println!("{}", render_result(&result));
    if !result.completed {
        println!("Run the same command again to resume task '{task}'.");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetSettings;
    use crate::storage::ContentStore;
    use tempfile::TempDir;

    fn args(location: &str, config: PathBuf) -> ImportArgs {
        ImportArgs {
            location: location.to_string(),
            config: Some(config),
            dataset_config: None,
            parent: None,
            tags: None,
            task: None,
            time_budget: None,
            milestone: None,
            restart: false,
        }
    }

    #[test]
    fn test_import_persists_store() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = dir.path().join("people.csv");
        let config = dir.path().join("people.yaml");
        std::fs::write(&source, "id,name\n1,Alice\n2,Bob\n").expect("write");
        std::fs::write(&config, "pages:\n  tags: import\n").expect("write");
        let settings = DatasetSettings::new()
            .with_state_dir(dir.path().join("state"))
            .with_store_path(dir.path().join("store.json"));

        let context = CommandContext::open(settings.clone(), None).expect("open");
        let location = source.display().to_string();
        let result = execute(&context, &args(&location, config)).expect("import");
        assert!(result.completed);

        let reopened = CommandContext::open(settings, None).expect("reopen");
        assert_eq!(
            reopened
                .store
                .count("template=basic-page")
                .expect("count"),
            2
        );
    }

    #[test]
    fn test_import_rejects_unknown_tag() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("c.yaml");
        std::fs::write(&config, "pages:\n  tags: import\n").expect("write");
        let settings = DatasetSettings::new()
            .with_state_dir(dir.path())
            .with_store_path(dir.path().join("store.json"));
        let context = CommandContext::open(settings, None).expect("open");

        let mut args = args("missing.csv", config);
        args.tags = Some("import,explode".to_string());
        assert!(execute(&context, &args).is_err());
    }
}
