//! TaskProcessor / Lifecycle ports - ユーザーが差し込む処理
//!
//! サブクラス化ではなく、trait object として run loop に注入します。

use async_trait::async_trait;

use crate::app::ProcessContext;
use crate::domain::{ProcessError, Task};

/// The pluggable processing capability, invoked once per claimed task.
///
/// # 使用例
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl TaskProcessor for Echo {
///     async fn process(&self, task: &mut Task, _ctx: &ProcessContext) -> Result<(), ProcessError> {
///         task.set("output", "ok");
///         task.mark_done();
///         Ok(())
///     }
/// }
/// ```
///
/// Errors are contained: the run loop records them on the task and moves on.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &mut Task, ctx: &ProcessContext) -> Result<(), ProcessError>;
}

/// Override points around the run. All default to no-op.
///
/// A panic in any hook never escapes `run()`: per-task hook panics are
/// recorded on the task, `prepare_env` panics end the run after teardown.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Once, before the first task is claimed.
    async fn prepare_env(&self) {}

    /// Once, when the run ends (normally, on error, or from the shutdown handler).
    async fn cleanup_env(&self) {}

    /// Before each task is processed, e.g. fetching inputs.
    /// On `Err` the processor is skipped and the task is saved with the error.
    async fn prepare_run(&self, _task: &Task) -> Result<(), ProcessError> {
        Ok(())
    }

    /// After each task has been persisted. Errors are logged only: the task
    /// document is already saved.
    async fn cleanup_run(&self, _task: &Task) -> Result<(), ProcessError> {
        Ok(())
    }
}

pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {}
