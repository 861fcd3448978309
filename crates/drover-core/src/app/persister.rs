//! ConflictResolvingPersister - 競合時はワーカーの結果で上書きする保存
//!
//! # フロー
//! 1. save
//! 2. Conflict なら最新リビジョンを get し、リビジョンだけを書き換えて再 save
//! 3. Conflict 以外のエラーはリトライせずに返す
//!
//! マージはしません。ワーカーが計算した結果が、途中に割り込んだ書き込み
//! （監視ツールなど）より優先されます。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::Task;
use crate::ports::{DocumentStore, StoreError};

#[derive(Clone)]
pub struct ConflictResolvingPersister {
    store: Arc<dyn DocumentStore>,
}

impl ConflictResolvingPersister {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Save `task`, retrying on conflict until it lands.
    ///
    /// Returns the number of conflicts that were resolved.
    pub async fn save(&self, task: &mut Task) -> Result<u32, StoreError> {
        let mut conflicts = 0;
        loop {
            match self.store.save(task).await {
                Ok(()) => {
                    debug!(target: "drover.persist", task_id = %task.id(), conflicts, "saved");
                    return Ok(conflicts);
                }
                Err(e) if e.is_conflict() => {
                    conflicts += 1;
                    let latest = self.store.get(task.id()).await?;
                    warn!(
                        target: "drover.persist",
                        task_id = %task.id(),
                        conflicts,
                        "write conflict; overwriting with worker result"
                    );
                    task.set_rev(latest.rev().cloned());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStore;
    use serde_json::json;

    #[tokio::test]
    async fn single_conflict_is_retried_once_and_worker_wins() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let persister = ConflictResolvingPersister::new(store.clone());

        let mut task = store.get(&"t1".into()).await.unwrap();
        task.set("result", "worker");
        store.interleave_writes(1);

        let conflicts = persister.save(&mut task).await.unwrap();

        assert_eq!(conflicts, 1);
        // first attempt + exactly one retry
        assert_eq!(store.saves(), 2);
        // the revision was re-read before retrying (setup get + one re-read)
        assert_eq!(store.gets(), 2);

        let stored = store.get(&"t1".into()).await.unwrap();
        assert_eq!(stored.get("result"), Some(&json!("worker")));
        // the interleaved writer's field is gone: last writer wins, no merge
        assert_eq!(stored.get("monitor"), None);
    }

    #[tokio::test]
    async fn repeated_conflicts_are_retried_until_saved() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let persister = ConflictResolvingPersister::new(store.clone());

        let mut task = store.get(&"t1".into()).await.unwrap();
        store.interleave_writes(3);

        assert_eq!(persister.save(&mut task).await.unwrap(), 3);
        assert_eq!(store.saves(), 4);
    }

    #[tokio::test]
    async fn non_conflict_errors_are_not_retried() {
        let store = Arc::new(RecordingStore::with_tasks(["t1"]).await);
        let persister = ConflictResolvingPersister::new(store.clone());

        let mut task = store.get(&"t1".into()).await.unwrap();
        store.fail_saves(StoreError::Backend("disk full".into()));

        let err = persister.save(&mut task).await.unwrap_err();
        assert_eq!(err, StoreError::Backend("disk full".into()));
        assert_eq!(store.saves(), 1);
    }
}
