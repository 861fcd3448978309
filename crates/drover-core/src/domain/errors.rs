//! Errors - タスク処理エラーの分類
//!
//! 処理関数が返したエラーは run loop で一箇所だけ捕捉され、
//! `as_label()`（種別タグ）とメッセージとしてタスクに記録されます。

use thiserror::Error;

use crate::ports::StoreError;
use crate::subprocess::SubprocessError;

/// Error returned by a task processor.
///
/// Never fatal to the run loop: it is annotated onto the task and persisted.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("subprocess: {0}")]
    Subprocess(#[from] SubprocessError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("processor panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProcessError::Failed(message.into())
    }

    /// Short stable label (snake_case), stored as the error kind on the task.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Failed(_) => "task_failed",
            ProcessError::Subprocess(_) => "task_subprocess",
            ProcessError::Store(_) => "task_store",
            ProcessError::Panicked(_) => "task_panicked",
            ProcessError::Other(_) => "task_error",
        }
    }
}
