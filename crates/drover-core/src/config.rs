//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::DEFAULT_GRACE;
use crate::domain::TokenReset;
use crate::impls::view_source::{DEFAULT_POLL_INTERVAL, DEFAULT_VIEW};

/// Settings for one worker process.
///
/// Stop conditions live in [`StopCriteria`](crate::app::StopCriteria) since
/// they are given per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// `(lock, done)` written back when killed mid-task.
    pub token_reset: TokenReset,
    /// How long a subprocess gets between SIGTERM and SIGKILL.
    pub grace: Duration,
    /// View the default task source claims from.
    pub view: String,
    /// Keep polling `view` after it runs dry.
    pub endless: bool,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    /// Reset to todo, 30s grace, bounded `todo` view.
    fn default() -> Self {
        Self {
            token_reset: TokenReset::default(),
            grace: DEFAULT_GRACE,
            view: DEFAULT_VIEW.to_string(),
            endless: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
