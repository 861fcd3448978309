//! RunActor - タスクを 1 件ずつ claim して処理するメインループ
//!
//! # 1 サイクル
//! 1. `prepare_run` フック（失敗したら処理をスキップしてエラーを記録）
//! 2. `current_task` をセット（処理開始より必ず前）
//! 3. TaskProcessor を実行。エラーや panic はタスクに記録するだけでループは止めない
//! 4. ConflictResolvingPersister で保存（成功・失敗どちらでも）
//! 5. `cleanup_run` フック
//! 6. 処理件数をインクリメント
//! 7. `current_task` をクリア
//! 8. StopPolicy を評価
//!
//! # シャットダウンとの協調
//! - 保存と `current_task` の更新は persist gate の中で行う
//! - gate を取った時点で shutting_down なら保存せずに `RunError::Interrupted` を返す
//!   （タスクの巻き戻しは ShutdownHandler の担当）
//!
//! # teardown
//! `cleanup_env` は割り込み以外のすべての終了経路（正常終了・エラー・panic）で 1 回だけ実行

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::shutdown::revert_task;
use crate::app::unwind::catch_panic;
use crate::app::{
    ConflictResolvingPersister, ProcessContext, RunState, RunSummary, ShutdownHandler,
    StopCriteria, StopPolicy, StopReason, install_shutdown_handler,
};
use crate::domain::{ProcessError, Task};
use crate::error::RunError;
use crate::ports::{DocumentStore, Lifecycle, TaskProcessor, TaskSource};
use crate::timer::ElapsedTimer;

pub struct RunActor {
    store: Arc<dyn DocumentStore>,
    source: Box<dyn TaskSource>,
    processor: Arc<dyn TaskProcessor>,
    lifecycle: Arc<dyn Lifecycle>,
    persister: ConflictResolvingPersister,
    state: Arc<RunState>,
    grace: Duration,
    handle_signals: bool,
}

impl RunActor {
    pub(crate) fn from_parts(
        store: Arc<dyn DocumentStore>,
        source: Box<dyn TaskSource>,
        processor: Arc<dyn TaskProcessor>,
        lifecycle: Arc<dyn Lifecycle>,
        state: Arc<RunState>,
        grace: Duration,
        handle_signals: bool,
    ) -> Self {
        Self {
            persister: ConflictResolvingPersister::new(Arc::clone(&store)),
            store,
            source,
            processor,
            lifecycle,
            state,
            grace,
            handle_signals,
        }
    }

    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    /// A handler bound to this actor's state, store and hooks.
    pub fn shutdown_handler(&self) -> ShutdownHandler {
        ShutdownHandler::new(
            Arc::clone(&self.state),
            Arc::clone(&self.store),
            Arc::clone(&self.lifecycle),
        )
        .with_grace(self.grace)
    }

    /// Drain the source until it is exhausted or `criteria` says stop.
    ///
    /// `cleanup_env` runs exactly once unless the shutdown handler takes over,
    /// in which case the handler runs it.
    pub async fn run(&mut self, criteria: StopCriteria) -> Result<RunSummary, RunError> {
        let listener = if self.handle_signals {
            Some(install_shutdown_handler(self.shutdown_handler())?)
        } else {
            None
        };

        let timer = ElapsedTimer::start();
        if let Err(panic) = catch_panic(self.lifecycle.prepare_env()).await {
            error!(target: "drover.actor", %panic, "prepare_env panicked");
            self.teardown(listener).await;
            return Err(RunError::Panicked(panic));
        }

        let policy = StopPolicy::new(criteria);
        if self.source.is_endless()
            && let Some(predicate) = policy.predicate()
        {
            self.source.set_stop_predicate(predicate.clone());
        }

        let result = match catch_panic(self.drain(&policy, &timer)).await {
            Ok(result) => result,
            Err(panic) => {
                error!(target: "drover.actor", %panic, "run loop panicked");
                self.state.clear_current();
                Err(RunError::Panicked(panic))
            }
        };

        if let Err(RunError::Interrupted) = result {
            info!(target: "drover.actor", "run interrupted; shutdown handler owns teardown");
            wait_for_listener(listener).await;
            return Err(RunError::Interrupted);
        }

        self.teardown(listener).await;

        let stop_reason = result?;
        let summary = RunSummary {
            tasks_processed: self.state.tasks_processed(),
            elapsed: timer.elapsed(),
            stop_reason,
        };
        info!(
            target: "drover.actor",
            tasks_processed = summary.tasks_processed,
            elapsed = ?summary.elapsed,
            stop_reason = ?summary.stop_reason,
            "run finished"
        );
        Ok(summary)
    }

    /// Stop listening for signals, then run `cleanup_env` unless the handler already did.
    async fn teardown(&self, listener: Option<JoinHandle<()>>) {
        // a handler that is already running keeps going and exits the process itself
        if let Some(listener) = listener {
            listener.abort();
        }
        if self.state.claim_teardown()
            && let Err(panic) = catch_panic(self.lifecycle.cleanup_env()).await
        {
            error!(target: "drover.actor", %panic, "cleanup_env panicked");
        }
    }

    /// `Ok(None)` when the source ran dry.
    async fn drain(
        &mut self,
        policy: &StopPolicy,
        timer: &ElapsedTimer,
    ) -> Result<Option<StopReason>, RunError> {
        loop {
            if self.state.is_shutting_down() {
                return Err(RunError::Interrupted);
            }

            let Some(task) = self.source.next_task().await? else {
                return Ok(None);
            };

            let processed = self.run_cycle(task).await?;

            if let Some(reason) = policy.stop_reason(processed, timer.elapsed()) {
                info!(target: "drover.actor", %reason, "stop condition met");
                return Ok(Some(reason));
            }
        }
    }

    /// One full cycle. Returns the processed count after this task.
    async fn run_cycle(&self, task: Task) -> Result<u64, RunError> {
        let prepared = contained(self.lifecycle.prepare_run(&task)).await;

        {
            let _gate = self.state.lock_persist().await;
            if self.state.is_shutting_down() {
                // handler may already be past its revert step; undo our own claim
                if let Err((id, e)) =
                    revert_task(self.state.token_reset(), &*self.store, Some(task)).await
                {
                    error!(target: "drover.actor", task_id = %id, error = %e, "token reset failed");
                }
                return Err(RunError::Interrupted);
            }
            self.state.set_current(&task);
        }

        let (mut task, result) = match prepared {
            Ok(()) => {
                info!(target: "drover.actor", task_id = %task.id(), "processing task");
                self.dispatch(task).await
            }
            Err(e) => (task, Err(e)),
        };
        if let Err(e) = result {
            warn!(
                target: "drover.actor",
                task_id = %task.id(),
                kind = e.as_label(),
                error = %e,
                "task failed"
            );
            task.error(e.as_label(), e.to_string());
        }

        {
            let _gate = self.state.lock_persist().await;
            if self.state.is_shutting_down() {
                return Err(RunError::Interrupted);
            }
            if let Err(e) = self.persister.save(&mut task).await {
                self.state.clear_current();
                return Err(e.into());
            }
            // a shutdown from here on resets the saved revision, not the claim
            self.state.set_current(&task);
        }

        if let Err(e) = contained(self.lifecycle.cleanup_run(&task)).await {
            warn!(target: "drover.actor", task_id = %task.id(), error = %e, "cleanup_run failed");
        }
        let processed = self.state.increment_processed();
        self.state.clear_current();

        info!(
            target: "drover.actor",
            task_id = %task.id(),
            status = task.status().as_str(),
            processed,
            "task finished"
        );
        Ok(processed)
    }

    /// Run the processor; a panic is reported against the task as it was before.
    async fn dispatch(&self, mut task: Task) -> (Task, Result<(), ProcessError>) {
        let fallback = task.clone();
        let ctx = ProcessContext::new(Arc::clone(&self.state));

        match catch_panic(self.processor.process(&mut task, &ctx)).await {
            Ok(result) => (task, result),
            Err(panic) => (fallback, Err(ProcessError::Panicked(panic))),
        }
    }
}

async fn contained<F>(hook: F) -> Result<(), ProcessError>
where
    F: Future<Output = Result<(), ProcessError>>,
{
    catch_panic(hook)
        .await
        .unwrap_or_else(|panic| Err(ProcessError::Panicked(panic)))
}

async fn wait_for_listener(listener: Option<JoinHandle<()>>) {
    // the listener exits the process once the handler is done
    if let Some(listener) = listener {
        let _ = listener.await;
    }
}
