use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use drover_core::StopCriteria;
use drover_core::WorkerConfig;
use drover_core::domain::TokenReset;
use drover_core::observability::{LoggerConfig, LoggerFormat};

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(about = "Claim tasks from a store, run them, and put them back if killed")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every task in a JSON file and print the final documents
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON array of task documents
    #[arg(long, value_name = "FILE")]
    pub tasks: PathBuf,

    /// Shell command for tasks without a `command` field
    #[arg(long, value_name = "SHELL")]
    pub command: Option<String>,

    /// Wall-clock budget in seconds
    #[arg(long, value_name = "SECS", value_parser = parse_secs)]
    pub max_time: Option<Duration>,

    /// Expected seconds per task, added to the elapsed time before comparing with --max-time
    #[arg(long, value_name = "SECS", value_parser = parse_secs, default_value = "0")]
    pub avg_time_factor: Duration,

    /// Stop after this many tasks (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub max_tasks: u64,

    /// Keep polling for new tasks once the queue is empty
    #[arg(long)]
    pub endless: bool,

    #[arg(long, value_name = "SECS", value_parser = parse_secs, default_value = "10")]
    pub poll_interval: Duration,

    /// Stop once this file exists
    #[arg(long, value_name = "PATH")]
    pub stop_file: Option<PathBuf>,

    /// Leave the task locked when killed mid-task
    #[arg(long, conflicts_with_all = ["reset_lock", "reset_done"])]
    pub no_token_reset: bool,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub reset_lock: i64,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub reset_done: i64,

    /// Seconds between SIGTERM and SIGKILL for a running command
    #[arg(long, value_name = "SECS", value_parser = parse_secs, default_value = "30")]
    pub grace: Duration,

    #[arg(long, default_value = "text")]
    pub log_format: LoggerFormat,

    /// Filter directive, e.g. `info` or `drover=debug`
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl RunArgs {
    pub fn worker_config(&self) -> WorkerConfig {
        let token_reset = if self.no_token_reset {
            TokenReset::Disabled
        } else {
            TokenReset::values(self.reset_lock, self.reset_done)
        };
        WorkerConfig {
            token_reset,
            grace: self.grace,
            endless: self.endless,
            poll_interval: self.poll_interval,
            ..WorkerConfig::default()
        }
    }

    /// Stop conditions except the stop file, which needs a predicate.
    pub fn stop_criteria(&self) -> StopCriteria {
        let mut criteria = StopCriteria::new()
            .with_avg_time_factor(self.avg_time_factor)
            .with_max_tasks(self.max_tasks);
        if let Some(max_time) = self.max_time {
            criteria = criteria.with_max_time(max_time);
        }
        criteria
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: self.log_format,
            level: self.log_level.clone(),
            ..LoggerConfig::default()
        }
    }
}

fn parse_secs(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{s}: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{s}: {e}"))
}
