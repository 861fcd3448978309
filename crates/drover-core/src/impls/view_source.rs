//! View-backed task sources.
//!
//! # フロー
//! 1. `todo` ビューから候補を取得
//! 2. `lock_now()` して save（claim）
//! 3. Conflict なら他のワーカーが先に claim したのでスキップ
//! 4. ビューが空になったら終了（Endless は poll し続ける）

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::Task;
use crate::ports::{DocumentStore, StopPredicate, StoreError, TaskSource};

pub const DEFAULT_VIEW: &str = "todo";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded source: claims tasks from a view until the view is empty.
pub struct ViewSource {
    store: Arc<dyn DocumentStore>,
    view: String,
    batch: usize,
    pending: VecDeque<Task>,
}

impl ViewSource {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            view: DEFAULT_VIEW.to_string(),
            batch: 1,
            pending: VecDeque::new(),
        }
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = view.into();
        self
    }

    /// Number of candidates fetched per view query.
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    async fn claim(&self, mut task: Task) -> Result<Option<Task>, StoreError> {
        task.lock_now();
        match self.store.save(&mut task).await {
            Ok(()) => {
                info!(target: "drover.source", task_id = %task.id(), "claimed task");
                Ok(Some(task))
            }
            Err(e) if e.is_conflict() => {
                debug!(target: "drover.source", task_id = %task.id(), "claimed elsewhere; skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TaskSource for ViewSource {
    async fn next_task(&mut self) -> Result<Option<Task>, StoreError> {
        loop {
            if self.pending.is_empty() {
                let candidates = self.store.view(&self.view, self.batch).await?;
                if candidates.is_empty() {
                    return Ok(None);
                }
                self.pending.extend(candidates);
            }

            while let Some(candidate) = self.pending.pop_front() {
                if let Some(task) = self.claim(candidate).await? {
                    return Ok(Some(task));
                }
            }
        }
    }
}

/// Unbounded source: polls the view forever until its stop predicate fires.
pub struct EndlessViewSource {
    inner: ViewSource,
    poll_interval: Duration,
    stop: Option<StopPredicate>,
}

impl EndlessViewSource {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner: ViewSource::new(store),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop: None,
        }
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.inner = self.inner.with_view(view);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl TaskSource for EndlessViewSource {
    async fn next_task(&mut self) -> Result<Option<Task>, StoreError> {
        loop {
            if let Some(stop) = &self.stop
                && stop.should_stop()
            {
                info!(target: "drover.source", "stop predicate met; ending endless view");
                return Ok(None);
            }

            if let Some(task) = self.inner.next_task().await? {
                return Ok(Some(task));
            }

            debug!(
                target: "drover.source",
                interval = ?self.poll_interval,
                "view empty; polling again"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn is_endless(&self) -> bool {
        true
    }

    fn set_stop_predicate(&mut self, predicate: StopPredicate) {
        self.stop = Some(predicate);
    }
}
