use thiserror::Error;

use crate::ports::StoreError;

/// Run-level failures. Task-level errors never show up here; they are
/// recorded on the task document instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("signal handler: {0}")]
    Signal(String),

    /// The run was cut short by the shutdown handler.
    #[error("interrupted by shutdown")]
    Interrupted,

    /// A task source or environment hook panicked. Teardown has already run.
    #[error("run loop panicked: {0}")]
    Panicked(String),
}

impl RunError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Store(_) => "run_store",
            RunError::Signal(_) => "run_signal",
            RunError::Interrupted => "run_interrupted",
            RunError::Panicked(_) => "run_panicked",
        }
    }

    /// Exit code the CLI uses for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Interrupted => 0,
            _ => 1,
        }
    }
}
