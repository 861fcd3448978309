//! Domain identifiers.
//!
//! Task ドキュメントは文書ストア側の文字列 ID を持ちます。
//! 新規に作るドキュメントには ULID ベースの ID を割り当てます。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 調整なしで複数ワーカーで生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a task document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Fresh ULID-based id, prefixed like `task-01J...`.
    pub fn generate() -> Self {
        Self(format!("task-{}", Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque revision token used for optimistic concurrency.
///
/// The store hands out a new token on every successful save; a save carrying
/// a stale token is rejected as a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// `{generation}-{ulid}`, the format produced by the in-memory store.
    pub fn next(generation: u64) -> Self {
        Self(format!("{generation}-{}", Ulid::new().to_string().to_lowercase()))
    }

    /// Generation prefix of the token, if it has one.
    pub fn generation(&self) -> Option<u64> {
        self.0.split_once('-').and_then(|(g, _)| g.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
