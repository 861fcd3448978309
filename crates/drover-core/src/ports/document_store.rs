//! DocumentStore port - タスクドキュメントの正本（source of truth）
//!
//! # 設計原則
//! - 書き込みはリビジョントークンによる楽観的並行性制御
//! - 古いリビジョンでの save は `StoreError::Conflict`
//! - save 成功時にストアが新しいリビジョンをタスクに書き戻す

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Task, TaskId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document update conflict: {0}")]
    Conflict(TaskId),

    #[error("document not found: {0}")]
    NotFound(TaskId),

    #[error("unknown view: {0}")]
    UnknownView(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Client side of the shared document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current revision of a document.
    async fn get(&self, id: &TaskId) -> Result<Task, StoreError>;

    /// Write the document. On success the new revision is set on `task`.
    async fn save(&self, task: &mut Task) -> Result<(), StoreError>;

    /// Up to `limit` documents of a named view (`todo`, `locked`, `done`, `error`).
    async fn view(&self, name: &str, limit: usize) -> Result<Vec<Task>, StoreError>;
}
