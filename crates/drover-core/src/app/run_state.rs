//! RunState - run loop とシャットダウンハンドラが共有する状態
//!
//! # 遷移点
//! - set current / clear current（run loop）
//! - set subprocess / clear subprocess（処理コード）
//!
//! いずれも短時間だけ `std::sync::Mutex` を取ります（await を跨がない）。
//! shutting_down の立ち上げとサブプロセスの登録も同じロックの中で行うので、
//! ハンドラが見落とした子プロセスが動き続けることはありません。
//! persist gate は「保存中」とシャットダウンの revert を直列化します。

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::Command;

use crate::domain::{Task, TokenReset};
use crate::subprocess::{SubprocessError, SubprocessHandle, check_exit};

#[derive(Default)]
struct Slots {
    current_task: Option<Task>,
    subprocess: Option<SubprocessHandle>,
}

/// Process-wide state of one worker.
pub struct RunState {
    slots: Mutex<Slots>,
    tasks_processed: AtomicU64,
    token_reset: TokenReset,
    shutting_down: AtomicBool,
    torn_down: AtomicBool,
    persist_gate: tokio::sync::Mutex<()>,
}

impl RunState {
    pub fn new(token_reset: TokenReset) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            tasks_processed: AtomicU64::new(0),
            token_reset,
            shutting_down: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            persist_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // a panic while holding the lock cannot leave the slots half-written
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token_reset(&self) -> TokenReset {
        self.token_reset
    }

    /// Snapshot of the task being processed, taken when it was marked current.
    pub fn current_task(&self) -> Option<Task> {
        self.slots().current_task.clone()
    }

    pub fn has_current_task(&self) -> bool {
        self.slots().current_task.is_some()
    }

    pub(crate) fn set_current(&self, task: &Task) {
        self.slots().current_task = Some(task.clone());
    }

    pub(crate) fn clear_current(&self) {
        self.slots().current_task = None;
    }

    pub fn subprocess(&self) -> Option<SubprocessHandle> {
        self.slots().subprocess.clone()
    }

    #[cfg(test)]
    pub(crate) fn set_subprocess(&self, handle: SubprocessHandle) {
        self.slots().subprocess = Some(handle);
    }

    /// Spawn `cmd` and register it, unless shutdown has begun.
    pub(crate) fn spawn_tracked(&self, cmd: Command) -> Result<SubprocessHandle, SubprocessError> {
        let mut slots = self.slots();
        if self.is_shutting_down() {
            return Err(SubprocessError::Spawn("worker is shutting down".into()));
        }
        let handle = SubprocessHandle::spawn(cmd)?;
        slots.subprocess = Some(handle.clone());
        Ok(handle)
    }

    pub(crate) fn clear_subprocess(&self) {
        self.slots().subprocess = None;
    }

    pub fn tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_processed(&self) -> u64 {
        self.tasks_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Raise the shutdown flag and return the subprocess to stop, if any.
    ///
    /// After this returns no new subprocess can be registered.
    pub(crate) fn begin_shutdown(&self) -> Option<SubprocessHandle> {
        let slots = self.slots();
        self.shutting_down.store(true, Ordering::SeqCst);
        slots.subprocess.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// `true` exactly once per process; whoever wins runs the teardown hook.
    pub(crate) fn claim_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }

    pub(crate) async fn lock_persist(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.persist_gate.lock().await
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(TokenReset::default())
    }
}

/// Handed to the processor for each task.
#[derive(Clone)]
pub struct ProcessContext {
    state: Arc<RunState>,
}

struct SubprocessSlot<'a>(&'a RunState);

impl Drop for SubprocessSlot<'_> {
    fn drop(&mut self) {
        self.0.clear_subprocess();
    }
}

impl ProcessContext {
    pub fn new(state: Arc<RunState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run `cmd` as the tracked subprocess, so a shutdown signal can stop it.
    /// Fails with [`SubprocessError::Spawn`] once shutdown has begun.
    ///
    /// The handle is cleared again once the child has been reaped, or if this
    /// future is dropped first.
    pub async fn run_tracked(&self, cmd: Command) -> Result<ExitStatus, SubprocessError> {
        let handle = self.state.spawn_tracked(cmd)?;
        let _slot = SubprocessSlot(&self.state);
        handle.wait().await
    }

    /// Like [`run_tracked`](Self::run_tracked), failing on a non-zero exit.
    pub async fn run_checked(&self, cmd: Command) -> Result<(), SubprocessError> {
        check_exit(self.run_tracked(cmd).await?)
    }
}
