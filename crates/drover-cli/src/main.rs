use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use drover_core::{ActorBuilder, RunError};
use drover_core::domain::Task;
use drover_core::impls::InMemoryStore;
use drover_core::observability::logger_init;
use drover_core::ports::StopPredicate;
use serde_json::{Value, json};
use tracing::{error, info};

mod cli;
mod shell;

use cli::{Cli, Commands, RunArgs};
use shell::ShellProcessor;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(exit_code(&err)),
    }
}

/// Run errors pick their own code; anything else (bad input, logger setup) is 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<RunError>() {
        Some(run) => {
            error!(target: "drover.cli", kind = run.as_label(), error = %run, "run failed");
            run.exit_code()
        }
        None => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    logger_init(&args.logger_config())?;

    let tasks = load_tasks(&args.tasks)?;
    let store = Arc::new(InMemoryStore::new());
    store.load(tasks).await?;
    info!(target: "drover.cli", counts = ?store.counts().await, "tasks loaded");

    let mut criteria = args.stop_criteria();
    if let Some(path) = &args.stop_file {
        criteria = criteria.with_predicate(StopPredicate::new(
            |args| args["path"].as_str().is_some_and(|p| Path::new(p).exists()),
            json!({ "path": path }),
        ));
    }

    let mut actor = ActorBuilder::new()
        .store(store.clone())
        .processor(ShellProcessor::new(args.command.clone()))
        .config(args.worker_config())
        .handle_signals(true)
        .build()?;

    let summary = actor.run(criteria).await?;

    let report = json!({
        "tasks_processed": summary.tasks_processed,
        "elapsed_secs": summary.elapsed.as_secs_f64(),
        "stop_reason": summary.stop_reason.map(|r| r.to_string()),
        "counts": store.counts().await,
        "tasks": store.snapshot().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Read a JSON array of task documents. Revisions are dropped: the store assigns its own.
fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let Value::Array(items) = value else {
        bail!("{}: expected a JSON array of tasks", path.display());
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let mut task = Task::from_value(item).with_context(|| format!("task #{i}"))?;
            task.set_rev(None);
            Ok(task)
        })
        .collect()
}
