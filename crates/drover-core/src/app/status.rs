use std::time::Duration;

use serde::Serialize;

use crate::app::StopReason;
use crate::domain::TaskStatus;

/// Number of documents per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub todo: usize,
    pub locked: usize,
    pub done: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Todo => self.todo += 1,
            TaskStatus::Locked => self.locked += 1,
            TaskStatus::Done => self.done += 1,
            TaskStatus::Error => self.error += 1,
        }
    }
}

/// Result of a run that ended without being interrupted.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub tasks_processed: u64,
    pub elapsed: Duration,
    /// `None` when the source ran dry.
    pub stop_reason: Option<StopReason>,
}
