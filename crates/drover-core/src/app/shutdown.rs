//! ShutdownHandler - スケジューラに kill されたときの後始末
//!
//! # 順序
//! 1. 追跡中のサブプロセスを SIGTERM → grace 待ち → SIGKILL
//! 2. 処理中のタスクがあれば lock/done をリセット値に戻して保存（1 回だけ、best-effort）
//! 3. teardown フック
//! 4. プロセスを終了コード 0 で終了（`install_shutdown_handler` のみ）
//!
//! 1 は 2 より必ず先に完了します。処理コードがまだタスクを書き換えている可能性があるためです。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::RunState;
use crate::app::unwind::catch_panic;
use crate::domain::{Task, TaskId, TokenReset};
use crate::error::RunError;
use crate::ports::{DocumentStore, Lifecycle, StoreError};
use crate::subprocess::SubprocessHandle;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Terminate,
    Interrupt,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
        }
    }
}

/// What happened to the tracked subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprocessOutcome {
    NotTracked,
    AlreadyExited,
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Outlived the grace period and was force killed.
    Killed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub signal: ShutdownSignal,
    pub subprocess: SubprocessOutcome,
    /// Task whose token was written back with the reset pair.
    pub reset_task: Option<TaskId>,
    pub reset_error: Option<StoreError>,
    pub teardown_ran: bool,
}

pub struct ShutdownHandler {
    state: Arc<RunState>,
    store: Arc<dyn DocumentStore>,
    lifecycle: Arc<dyn Lifecycle>,
    grace: Duration,
}

impl ShutdownHandler {
    pub fn new(
        state: Arc<RunState>,
        store: Arc<dyn DocumentStore>,
        lifecycle: Arc<dyn Lifecycle>,
    ) -> Self {
        Self {
            state,
            store,
            lifecycle,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Steps 1-3. Never fails: every step is best-effort so the process can exit.
    pub async fn handle(&self, signal: ShutdownSignal) -> ShutdownReport {
        info!(target: "drover.shutdown", %signal, "shutting down");
        let subprocess = match self.state.begin_shutdown() {
            Some(handle) => stop_subprocess(&handle, self.grace).await,
            None => SubprocessOutcome::NotTracked,
        };

        // wait out an in-flight persist; the run loop will not start another
        let _gate = self.state.lock_persist().await;

        let current = self.state.current_task();
        let token_reset = self.state.token_reset();
        let (reset_task, reset_error) = match revert_task(token_reset, &*self.store, current).await {
            Ok(reset) => (reset, None),
            Err((id, e)) => {
                error!(target: "drover.shutdown", task_id = %id, error = %e, "token reset failed");
                (None, Some(e))
            }
        };

        let teardown_ran = self.state.claim_teardown();
        if teardown_ran && let Err(panic) = catch_panic(self.lifecycle.cleanup_env()).await {
            error!(target: "drover.shutdown", %panic, "cleanup_env panicked");
        }

        ShutdownReport {
            signal,
            subprocess,
            reset_task,
            reset_error,
            teardown_ran,
        }
    }
}

async fn stop_subprocess(handle: &SubprocessHandle, grace: Duration) -> SubprocessOutcome {
    if !handle.is_running() {
        return SubprocessOutcome::AlreadyExited;
    }

    info!(target: "drover.shutdown", pid = ?handle.pid(), "terminating subprocess");
    handle.terminate();
    if handle.wait_timeout(grace).await.is_some() {
        return SubprocessOutcome::Terminated;
    }

    info!(target: "drover.shutdown", pid = ?handle.pid(), ?grace, "killing subprocess");
    handle.kill();
    match handle.wait().await {
        Ok(_) => SubprocessOutcome::Killed,
        Err(e) => SubprocessOutcome::Failed(e.to_string()),
    }
}

/// Write the reset pair to `task`, if any and if enabled.
///
/// Single save attempt: the process is exiting either way.
pub(crate) async fn revert_task(
    token_reset: TokenReset,
    store: &dyn DocumentStore,
    task: Option<Task>,
) -> Result<Option<TaskId>, (TaskId, StoreError)> {
    let Some((lock, done)) = token_reset.pair() else {
        return Ok(None);
    };
    let Some(mut task) = task else {
        return Ok(None);
    };

    task.reset(lock, done);
    match store.save(&mut task).await {
        Ok(()) => {
            info!(target: "drover.shutdown", task_id = %task.id(), lock, done, "token reset");
            Ok(Some(task.id().clone()))
        }
        Err(e) => Err((task.id().clone(), e)),
    }
}

#[cfg(unix)]
struct ShutdownSignals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ShutdownSignal {
        // ctrl_c only fails if the handler cannot be installed; treat as a signal
        let _ = tokio::signal::ctrl_c().await;
        ShutdownSignal::Interrupt
    }
}

/// Register SIGTERM/SIGINT and run `handler` on the first one, then exit(0).
///
/// Registration happens before this returns, so a signal delivered right
/// after is not lost. Must be called from within a tokio runtime.
pub fn install_shutdown_handler(handler: ShutdownHandler) -> Result<JoinHandle<()>, RunError> {
    let mut signals = ShutdownSignals::register().map_err(|e| RunError::Signal(e.to_string()))?;
    info!(target: "drover.shutdown", "signal handlers installed");

    Ok(tokio::spawn(async move {
        let signal = signals.recv().await;
        let report = handler.handle(signal).await;
        info!(
            target: "drover.shutdown",
            subprocess = ?report.subprocess,
            reset_task = ?report.reset_task,
            "exiting"
        );
        std::process::exit(0);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::testing::{HookLog, RecordingStore};
    use std::sync::Mutex;

    async fn claimed(store: &RecordingStore, id: &str) -> crate::domain::Task {
        let mut task = store.stored(id).await;
        task.lock_now();
        store.save(&mut task).await.unwrap();
        task
    }

    fn handler(
        state: &Arc<RunState>,
        store: &Arc<RecordingStore>,
        hooks: &HookLog,
    ) -> ShutdownHandler {
        ShutdownHandler::new(Arc::clone(state), store.clone(), Arc::new(hooks.clone()))
    }

    #[tokio::test]
    async fn mid_task_resets_token_to_configured_pair() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let state = Arc::new(RunState::new(TokenReset::values(0, 0)));
        let hooks = HookLog::default();

        let mut task = claimed(&store, "t1").await;
        state.set_current(&task);
        // in-progress state that must not end up in the store
        task.set("output", "half");

        let saves_before = store.saves();
        let report = handler(&state, &store, &hooks)
            .handle(ShutdownSignal::Terminate)
            .await;

        assert_eq!(report.reset_task, Some(TaskId::new("t1")));
        assert_eq!(store.saves(), saves_before + 1);

        let stored = store.stored("t1").await;
        assert_eq!((stored.lock_value(), stored.done_value()), (0, 0));
        assert_eq!(stored.status(), TaskStatus::Todo);
        assert!(stored.get("output").is_none());
        assert!(report.teardown_ran);
        assert_eq!(hooks.entries(), vec!["cleanup_env"]);
    }

    #[tokio::test]
    async fn custom_reset_pair_is_written() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let state = Arc::new(RunState::new(TokenReset::values(-2, -2)));

        let task = claimed(&store, "t1").await;
        state.set_current(&task);

        handler(&state, &store, &HookLog::default())
            .handle(ShutdownSignal::Interrupt)
            .await;

        let stored = store.stored("t1").await;
        assert_eq!((stored.lock_value(), stored.done_value()), (-2, -2));
    }

    #[tokio::test]
    async fn between_tasks_nothing_is_saved() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let state = Arc::new(RunState::default());
        let hooks = HookLog::default();

        let saves_before = store.saves();
        let report = handler(&state, &store, &hooks)
            .handle(ShutdownSignal::Terminate)
            .await;

        assert_eq!(store.saves(), saves_before);
        assert_eq!(report.subprocess, SubprocessOutcome::NotTracked);
        assert_eq!(report.reset_task, None);
        assert_eq!(hooks.count("cleanup_env"), 1);
    }

    #[tokio::test]
    async fn disabled_reset_never_saves() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let state = Arc::new(RunState::new(TokenReset::Disabled));

        let task = claimed(&store, "t1").await;
        state.set_current(&task);

        let saves_before = store.saves();
        let report = handler(&state, &store, &HookLog::default())
            .handle(ShutdownSignal::Terminate)
            .await;

        assert_eq!(store.saves(), saves_before);
        assert_eq!(report.reset_task, None);
        assert_eq!(store.stored("t1").await.status(), TaskStatus::Locked);
    }

    #[tokio::test]
    async fn failed_reset_is_reported_not_raised() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let state = Arc::new(RunState::default());

        let task = claimed(&store, "t1").await;
        state.set_current(&task);
        store.fail_saves(StoreError::Backend("offline".into()));

        let report = handler(&state, &store, &HookLog::default())
            .handle(ShutdownSignal::Terminate)
            .await;

        assert_eq!(report.reset_task, None);
        assert_eq!(report.reset_error, Some(StoreError::Backend("offline".into())));
        assert!(report.teardown_ran);
    }

    #[tokio::test]
    async fn teardown_runs_at_most_once() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let state = Arc::new(RunState::default());
        let hooks = HookLog::default();
        assert!(state.claim_teardown());

        let report = handler(&state, &store, &hooks)
            .handle(ShutdownSignal::Terminate)
            .await;

        assert!(!report.teardown_ran);
        assert_eq!(hooks.count("cleanup_env"), 0);
    }

    #[cfg(unix)]
    mod with_subprocess {
        use super::*;
        use crate::app::ProcessContext;
        use crate::subprocess::SubprocessError;
        use tokio::process::Command;

        fn sh(script: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd
        }

        /// Records whether the subprocess was still alive at each save.
        fn liveness_at_save(store: &RecordingStore, handle: &SubprocessHandle) -> Arc<Mutex<Vec<bool>>> {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let (seen_in_hook, handle) = (Arc::clone(&seen), handle.clone());
            store.on_save(move |_| seen_in_hook.lock().unwrap().push(handle.is_running()));
            seen
        }

        #[tokio::test]
        async fn cooperative_subprocess_is_terminated_before_reset() {
            let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
            let state = Arc::new(RunState::default());

            let task = claimed(&store, "t1").await;
            state.set_current(&task);
            let child = SubprocessHandle::spawn(sh("exec sleep 30")).unwrap();
            state.set_subprocess(child.clone());
            let alive_at_save = liveness_at_save(&store, &child);

            let report = handler(&state, &store, &HookLog::default())
                .with_grace(Duration::from_secs(5))
                .handle(ShutdownSignal::Terminate)
                .await;

            assert_eq!(report.subprocess, SubprocessOutcome::Terminated);
            assert_eq!(*alive_at_save.lock().unwrap(), vec![false]);
            assert_eq!(store.stored("t1").await.status(), TaskStatus::Todo);
        }

        #[tokio::test]
        async fn stubborn_subprocess_is_killed_after_grace() {
            let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
            let state = Arc::new(RunState::default());

            let task = claimed(&store, "t1").await;
            state.set_current(&task);
            let child = SubprocessHandle::spawn(sh("trap '' TERM; sleep 30")).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            state.set_subprocess(child.clone());
            let alive_at_save = liveness_at_save(&store, &child);

            let report = handler(&state, &store, &HookLog::default())
                .with_grace(Duration::from_millis(300))
                .handle(ShutdownSignal::Terminate)
                .await;

            assert_eq!(report.subprocess, SubprocessOutcome::Killed);
            assert_eq!(*alive_at_save.lock().unwrap(), vec![false]);
            let stored = store.stored("t1").await;
            assert_eq!((stored.lock_value(), stored.done_value()), (0, 0));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn subprocess_spawned_during_shutdown_is_stopped_or_refused() {
            for _ in 0..50 {
                let store = Arc::new(RecordingStore::default());
                let state = Arc::new(RunState::default());
                let ctx = ProcessContext::new(Arc::clone(&state));
                let spawner = tokio::spawn(async move { ctx.run_tracked(sh("exec sleep 3")).await });

                let report = handler(&state, &store, &HookLog::default())
                    .with_grace(Duration::from_secs(2))
                    .handle(ShutdownSignal::Terminate)
                    .await;

                // nothing may be left running once the handler is done
                assert!(state.subprocess().is_none_or(|child| !child.is_running()));

                let outcome = tokio::time::timeout(Duration::from_secs(5), spawner)
                    .await
                    .expect("run_tracked returns once shutdown is handled")
                    .unwrap();
                match report.subprocess {
                    SubprocessOutcome::NotTracked => {
                        assert!(matches!(outcome, Err(SubprocessError::Spawn(_))));
                    }
                    other => {
                        assert_eq!(other, SubprocessOutcome::Terminated);
                        assert!(outcome.is_ok());
                    }
                }
            }
        }

        #[tokio::test]
        async fn exited_subprocess_is_left_alone() {
            let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
            let state = Arc::new(RunState::default());
            let child = SubprocessHandle::spawn(sh("exit 0")).unwrap();
            child.wait().await.unwrap();
            state.set_subprocess(child);

            let report = handler(&state, &store, &HookLog::default())
                .handle(ShutdownSignal::Terminate)
                .await;

            assert_eq!(report.subprocess, SubprocessOutcome::AlreadyExited);
        }
    }
}
