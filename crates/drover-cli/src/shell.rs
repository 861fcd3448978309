//! ShellProcessor - タスクごとにシェルコマンドを実行する TaskProcessor
//!
//! コマンドはタスクの `command` フィールド、なければ `--command` の値。
//! 子プロセスは ProcessContext 経由で起動するので、SIGTERM 時にはハンドラが止められます。

use std::process::Stdio;

use async_trait::async_trait;
use drover_core::app::ProcessContext;
use drover_core::domain::{ProcessError, Task};
use drover_core::ports::TaskProcessor;
use tokio::process::Command;

pub const TASK_ID_ENV: &str = "DROVER_TASK_ID";
pub const TASK_JSON_ENV: &str = "DROVER_TASK";

pub struct ShellProcessor {
    default_command: Option<String>,
}

impl ShellProcessor {
    pub fn new(default_command: Option<String>) -> Self {
        Self { default_command }
    }

    fn command_for(&self, task: &Task) -> Result<String, ProcessError> {
        match task.get("command") {
            Some(serde_json::Value::String(cmd)) => Ok(cmd.clone()),
            Some(other) => Err(ProcessError::failed(format!(
                "`command` must be a string, got {other}"
            ))),
            None => self
                .default_command
                .clone()
                .ok_or_else(|| ProcessError::failed("no command for task")),
        }
    }
}

#[async_trait]
impl TaskProcessor for ShellProcessor {
    async fn process(&self, task: &mut Task, ctx: &ProcessContext) -> Result<(), ProcessError> {
        let script = self.command_for(task)?;
        let payload = serde_json::to_string(task.payload())
            .map_err(|e| ProcessError::Other(e.into()))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&script)
            .env(TASK_ID_ENV, task.id().as_str())
            .env(TASK_JSON_ENV, payload)
            .stdin(Stdio::null())
            // stdout is reserved for the final report
            .stdout(std::io::stderr());

        ctx.run_checked(cmd).await?;
        task.mark_done();
        Ok(())
    }
}
