//! State - lock/done フィールドから導出されるキュー状態

use serde::{Deserialize, Serialize};

/// Queue state of a task, derived from its `(lock, done)` pair.
///
/// State transitions (owned by the store / task source, not by the run loop):
/// - Todo (0, 0) -> Locked (ts, 0) -> Done (ts, ts)
/// - Locked -> Error (-1, -1) when processing fails
/// - Locked -> Todo when a killed worker resets the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Locked,
    Done,
    Error,
}

impl TaskStatus {
    pub fn from_fields(lock: i64, done: i64) -> Self {
        if lock < 0 || done < 0 {
            TaskStatus::Error
        } else if done > 0 {
            TaskStatus::Done
        } else if lock > 0 {
            TaskStatus::Locked
        } else {
            TaskStatus::Todo
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Locked => "locked",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }
}

/// The `(lock, done)` pair written back when the worker is killed mid-task.
///
/// `Disabled` leaves the token untouched on forced shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenReset {
    Disabled,
    Values { lock: i64, done: i64 },
}

impl TokenReset {
    pub fn values(lock: i64, done: i64) -> Self {
        TokenReset::Values { lock, done }
    }

    pub fn pair(self) -> Option<(i64, i64)> {
        match self {
            TokenReset::Disabled => None,
            TokenReset::Values { lock, done } => Some((lock, done)),
        }
    }
}

impl Default for TokenReset {
    /// Back to `todo`.
    fn default() -> Self {
        TokenReset::Values { lock: 0, done: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, TaskStatus::Todo)]
    #[case(1_700_000_000, 0, TaskStatus::Locked)]
    #[case(1_700_000_000, 1_700_000_100, TaskStatus::Done)]
    #[case(-1, -1, TaskStatus::Error)]
    #[case(1_700_000_000, -1, TaskStatus::Error)]
    fn status_is_derived_from_lock_and_done(
        #[case] lock: i64,
        #[case] done: i64,
        #[case] expected: TaskStatus,
    ) {
        assert_eq!(TaskStatus::from_fields(lock, done), expected);
    }

    #[test]
    fn default_reset_goes_back_to_todo() {
        assert_eq!(TokenReset::default().pair(), Some((0, 0)));
        assert_eq!(TokenReset::Disabled.pair(), None);
    }
}
