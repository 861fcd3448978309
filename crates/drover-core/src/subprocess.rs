//! Tracked external processes.
//!
//! A [`SubprocessHandle`] is a cheap, cloneable view of a spawned child.
//! The child itself is owned by a background task that reaps it and publishes
//! the exit status, so the processing code can wait on the handle while the
//! shutdown handler terminates it from another task.
//!
//! Signals are delivered by the owner task too: it is the only one that reaps,
//! so the pid it signals cannot have been recycled yet.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{Notify, watch};
use tracing::{debug, trace};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubprocessError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32 },
    #[error("killed by signal")]
    KilledBySignal,
    #[error("exit status lost: {0}")]
    Lost(String),
}

type ExitSlot = Option<Result<ExitStatus, String>>;

#[derive(Debug, Clone)]
pub struct SubprocessHandle {
    pid: Option<u32>,
    exit: watch::Receiver<ExitSlot>,
    terminate: Arc<Notify>,
    kill: Arc<Notify>,
}

impl SubprocessHandle {
    /// Spawn `cmd` and start reaping it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut cmd: Command) -> Result<Self, SubprocessError> {
        cmd.kill_on_drop(true);
        let child = cmd
            .spawn()
            .map_err(|e| SubprocessError::Spawn(e.to_string()))?;
        let pid = child.id();

        let (exit_tx, exit_rx) = watch::channel(None);
        let terminate = Arc::new(Notify::new());
        let kill = Arc::new(Notify::new());

        let (term_requested, kill_requested) = (Arc::clone(&terminate), Arc::clone(&kill));
        tokio::spawn(async move {
            let status = own_child(child, &term_requested, &kill_requested).await;
            // receivers may already be gone
            let _ = exit_tx.send(Some(status.map_err(|e| e.to_string())));
        });

        trace!(target: "drover.subprocess", ?pid, "spawned");
        Ok(Self {
            pid,
            exit: exit_rx,
            terminate,
            kill,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` until the child has been reaped.
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Ask the child to stop (SIGTERM on unix, force kill elsewhere).
    /// No-op once it has exited.
    pub fn terminate(&self) {
        self.terminate.notify_one();
    }

    /// Force kill. The owner task reaps the child afterwards.
    pub fn kill(&self) {
        self.kill.notify_one();
    }

    /// Wait until the child has exited and been reaped.
    pub async fn wait(&self) -> Result<ExitStatus, SubprocessError> {
        let mut rx = self.exit.clone();
        let slot = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SubprocessError::Lost("owner task dropped".into()))?;
        match &*slot {
            Some(Ok(status)) => Ok(*status),
            Some(Err(e)) => Err(SubprocessError::Lost(e.clone())),
            None => Err(SubprocessError::Lost("no exit status".into())),
        }
    }

    /// `None` if the child is still running after `timeout`.
    pub async fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Result<ExitStatus, SubprocessError>> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

/// Reap `child`, delivering terminate/kill requests until it exits.
async fn own_child(
    mut child: Child,
    term_requested: &Notify,
    kill_requested: &Notify,
) -> std::io::Result<ExitStatus> {
    loop {
        tokio::select! {
            status = child.wait() => return status,
            _ = term_requested.notified() => {
                // `id()` is None once reaped; nothing reaps concurrently with this branch
                if let Some(pid) = child.id() {
                    trace!(target: "drover.subprocess", pid, "SIGTERM");
                    if let Err(e) = send_terminate(&mut child, pid) {
                        debug!(target: "drover.subprocess", pid, error = %e, "SIGTERM failed");
                    }
                }
            }
            _ = kill_requested.notified() => {
                trace!(target: "drover.subprocess", pid = ?child.id(), "force kill");
                if let Err(e) = child.start_kill() {
                    debug!(target: "drover.subprocess", error = %e, "kill failed");
                }
                return child.wait().await;
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(_child: &mut Child, pid: u32) -> Result<(), String> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|e| e.to_string())?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _pid: u32) -> Result<(), String> {
    child.start_kill().map_err(|e| e.to_string())
}

/// Map an exit status to `Ok` for success, an error otherwise.
pub fn check_exit(status: ExitStatus) -> Result<(), SubprocessError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(SubprocessError::NonZeroExit { code }),
        None => Err(SubprocessError::KilledBySignal),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn wait_reports_exit_code() {
        let handle = SubprocessHandle::spawn(sh("exit 3")).unwrap();
        let status = handle.wait().await.unwrap();

        assert_eq!(status.code(), Some(3));
        assert!(!handle.is_running());
        assert_eq!(
            check_exit(status),
            Err(SubprocessError::NonZeroExit { code: 3 })
        );
    }

    #[tokio::test]
    async fn terminate_stops_a_cooperative_child() {
        let handle = SubprocessHandle::spawn(sh("exec sleep 30")).unwrap();
        assert!(handle.is_running());

        handle.terminate();
        let status = handle
            .wait_timeout(Duration::from_secs(5))
            .await
            .expect("child should exit after SIGTERM")
            .unwrap();

        assert_eq!(check_exit(status), Err(SubprocessError::KilledBySignal));
    }

    #[tokio::test]
    async fn kill_stops_a_child_that_ignores_sigterm() {
        let handle = SubprocessHandle::spawn(sh("trap '' TERM; sleep 30")).unwrap();
        // let the shell install its trap first
        tokio::time::sleep(Duration::from_millis(200)).await;

        handle.terminate();
        assert!(handle.wait_timeout(Duration::from_millis(300)).await.is_none());

        handle.kill();
        let status = handle.wait_timeout(Duration::from_secs(5)).await;
        assert!(matches!(status, Some(Ok(_))));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let err = SubprocessHandle::spawn(Command::new("/definitely/not/a/binary")).unwrap_err();
        assert!(matches!(err, SubprocessError::Spawn(_)));
    }
}
