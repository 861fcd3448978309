use std::collections::VecDeque;

use async_trait::async_trait;

use crate::domain::Task;
use crate::ports::{StoreError, TaskSource};

/// Bounded source over tasks that are already claimed.
#[derive(Debug, Default)]
pub struct VecSource {
    tasks: VecDeque<Task>,
}

impl VecSource {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TaskSource for VecSource {
    async fn next_task(&mut self) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.pop_front())
    }
}
