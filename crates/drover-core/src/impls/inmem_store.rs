//! In-memory document store with optimistic concurrency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::app::StatusCounts;
use crate::domain::{Revision, Task, TaskId, TaskStatus};
use crate::ports::{DocumentStore, StoreError};

/// Revisioned document store kept in memory.
///
/// Design:
/// - Every successful save bumps the revision generation.
/// - A save whose revision differs from the stored one is a conflict.
/// - Views are the four queue states, ordered by task id.
#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<BTreeMap<TaskId, Task>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every task as a new document.
    pub async fn load(&self, tasks: impl IntoIterator<Item = Task>) -> Result<(), StoreError> {
        for mut task in tasks {
            self.save(&mut task).await?;
        }
        Ok(())
    }

    /// All documents, ordered by id.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.docs.lock().await.values().cloned().collect()
    }

    pub async fn counts(&self) -> StatusCounts {
        let docs = self.docs.lock().await;
        let mut counts = StatusCounts::default();
        for task in docs.values() {
            counts.record(task.status());
        }
        counts
    }
}

fn view_status(name: &str) -> Result<TaskStatus, StoreError> {
    match name {
        "todo" => Ok(TaskStatus::Todo),
        "locked" => Ok(TaskStatus::Locked),
        "done" => Ok(TaskStatus::Done),
        "error" => Ok(TaskStatus::Error),
        other => Err(StoreError::UnknownView(other.to_string())),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
        let docs = self.docs.lock().await;
        docs.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn save(&self, task: &mut Task) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;

        let generation = match docs.get(task.id()) {
            Some(stored) if stored.rev() != task.rev() => {
                return Err(StoreError::Conflict(task.id().clone()));
            }
            Some(stored) => stored.rev().and_then(Revision::generation).unwrap_or(0) + 1,
            // 存在しないドキュメントに rev 付きで書くのは古いコピー
            None if task.rev().is_some() => {
                return Err(StoreError::Conflict(task.id().clone()));
            }
            None => 1,
        };

        task.set_rev(Some(Revision::next(generation)));
        docs.insert(task.id().clone(), task.clone());
        Ok(())
    }

    async fn view(&self, name: &str, limit: usize) -> Result<Vec<Task>, StoreError> {
        let status = view_status(name)?;
        let docs = self.docs.lock().await;
        Ok(docs
            .values()
            .filter(|task| task.status() == status)
            .take(limit)
            .cloned()
            .collect())
    }
}
