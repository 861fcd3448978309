//! StopPolicy - タスク完了ごとに「止めるか」を判定
//!
//! # 判定（どれか 1 つでも真なら停止）
//! - カスタム述語が true を返す
//! - 処理済みタスク数が `max_tasks` に達した（`max_tasks > 0` のとき）
//! - `elapsed + avg_time_factor > max_time`（次のタスクで期限を超えそうなら開始前に止める）

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::StopPredicate;

/// Stop conditions for one run. Everything is optional; the default never stops.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StopCriteria {
    /// Wall-clock budget for the whole run.
    pub max_time: Option<Duration>,
    /// Expected duration of one task, added to the elapsed time before comparing
    /// against `max_time`.
    pub avg_time_factor: Duration,
    /// Stop after this many tasks (0 = unlimited).
    pub max_tasks: u64,
    #[serde(skip)]
    pub predicate: Option<StopPredicate>,
}

impl StopCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_avg_time_factor(mut self, avg: Duration) -> Self {
        self.avg_time_factor = avg;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: u64) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn with_predicate(mut self, predicate: StopPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// Why the run loop stopped before its source was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Predicate,
    MaxTasks { max_tasks: u64 },
    MaxTime { projected: Duration, max_time: Duration },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Predicate => write!(f, "stop predicate returned true"),
            StopReason::MaxTasks { max_tasks } => write!(f, "processed {max_tasks} tasks"),
            StopReason::MaxTime {
                projected,
                max_time,
            } => write!(f, "projected {projected:?} exceeds max time {max_time:?}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StopPolicy {
    criteria: StopCriteria,
}

impl StopPolicy {
    pub fn new(criteria: StopCriteria) -> Self {
        Self { criteria }
    }

    pub fn predicate(&self) -> Option<&StopPredicate> {
        self.criteria.predicate.as_ref()
    }

    pub fn should_stop(&self, tasks_processed: u64, elapsed: Duration) -> bool {
        self.stop_reason(tasks_processed, elapsed).is_some()
    }

    /// Evaluated after a task cycle has fully completed.
    pub fn stop_reason(&self, tasks_processed: u64, elapsed: Duration) -> Option<StopReason> {
        let c = &self.criteria;

        if let Some(predicate) = &c.predicate
            && predicate.should_stop()
        {
            return Some(StopReason::Predicate);
        }

        if c.max_tasks > 0 && tasks_processed >= c.max_tasks {
            return Some(StopReason::MaxTasks {
                max_tasks: c.max_tasks,
            });
        }

        if let Some(max_time) = c.max_time {
            let projected = elapsed.saturating_add(c.avg_time_factor);
            if projected > max_time {
                return Some(StopReason::MaxTime {
                    projected,
                    max_time,
                });
            }
        }

        None
    }
}
