//! Purge CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{CommandContext, load_import_config, render_result};
use crate::config::OperationTags;
use crate::models::InvocationResult;
use crate::services::PurgePipeline;
use crate::{Error, Result};
use clap::Args;
use std::path::PathBuf;

/// Arguments of `dataset purge`.
#[derive(Debug, Clone, Args)]
pub struct PurgeArgs {
    /// Import configuration naming the target kind.
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

    /// Task identifier.
    #[arg(long)]
    pub task: Option<String>,

    /// Wall-clock budget of this invocation in seconds.
    #[arg(long, env = "DATASET_TIME_BUDGET_SECS")]
    pub time_budget: Option<u64>,

    /// Confirms that the entities may be deleted.
    #[arg(long)]
    pub confirm: bool,

    /// Forget earlier progress and enumerate from scratch.
    #[arg(long)]
    pub restart: bool,
}

/// Runs one purge invocation and prints its result.
///
/// # Errors
///
/// Returns an error without `--confirm`, for invalid configurations and
/// when the invocation failed.
pub fn execute(context: &CommandContext, args: &PurgeArgs) -> Result<InvocationResult> {
    if !args.confirm {
        return Err(Error::InvalidInput(
            "purging deletes entities; pass --confirm to proceed".to_string(),
        ));
    }
    let config = load_import_config(args.dataset_config.as_deref(), args.config.as_deref())?;
    let parent = context.parent(args.parent)?;
    let tags = match args.tags.as_deref() {
        Some(list) => OperationTags::parse(list)?,
        None => OperationTags::new(),
    };

    let task = args
        .task
        .clone()
        .unwrap_or_else(|| format!("purge-{parent}-{}", config.target.template));
    if args.restart {
        context.scheduler.reset(&task)?;
    }

    let pipeline = PurgePipeline::new(&context.store, &context.scheduler, parent)
        .with_settings(&context.settings.run)
        .with_tags(tags);
    let result = pipeline.run(&task, &config)?;
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
    use tempfile::TempDir;

    fn args(config: PathBuf, confirm: bool) -> PurgeArgs {
        PurgeArgs {
            config: Some(config),
            dataset_config: None,
            parent: None,
            tags: None,
            task: None,
            time_budget: None,
            confirm,
            restart: false,
        }
    }

    #[test]
    fn test_purge_requires_confirmation() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("c.yaml");
        std::fs::write(&config, "pages:\n  template: book\n  tags: purge\n").expect("write");
        let settings = DatasetSettings::new()
            .with_state_dir(dir.path())
            .with_store_path(dir.path().join("store.json"));
        let context = CommandContext::open(settings, None).expect("open");

        let err = execute(&context, &args(config.clone(), false)).expect_err("unconfirmed");
        assert!(matches!(err, Error::InvalidInput(_)));

        context
            .store
            .inner()
            .insert_entity(context.store.inner().root(), "book", &[("title", "A")])
            .expect("insert");
        let result = execute(&context, &args(config, true)).expect("purge");
        assert_eq!(result.summary.deleted, 1);
    }
}
