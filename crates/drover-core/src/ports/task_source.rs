//! TaskSource port - タスクを供給する遅延シーケンス
//!
//! 無限ソース（endless view）は自然に終わらないため、
//! 停止条件を外から注入して、ソース自身が「次の要素」を出す前に評価します。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::Task;
use crate::ports::StoreError;

type StopFn = dyn Fn(&Value) -> bool + Send + Sync;

/// User supplied stop condition plus its argument bag.
#[derive(Clone)]
pub struct StopPredicate {
    func: Arc<StopFn>,
    args: Value,
}

impl StopPredicate {
    pub fn new<F>(func: F, args: Value) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            args,
        }
    }

    pub fn should_stop(&self) -> bool {
        (self.func)(&self.args)
    }

    pub fn args(&self) -> &Value {
        &self.args
    }
}

impl fmt::Debug for StopPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopPredicate")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Produces claimed tasks one at a time.
///
/// `Ok(None)` is end-of-sequence. Claim semantics (who may take which task)
/// are the source's business, not the run loop's.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn next_task(&mut self) -> Result<Option<Task>, StoreError>;

    /// Unbounded sources never end on their own.
    fn is_endless(&self) -> bool {
        false
    }

    /// Register a predicate the source checks before producing each element.
    /// Bounded sources ignore it.
    fn set_stop_predicate(&mut self, _predicate: StopPredicate) {}
}
