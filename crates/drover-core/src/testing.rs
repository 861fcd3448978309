//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Map;

use crate::app::ProcessContext;
use crate::domain::{ProcessError, Task, TaskId};
use crate::impls::InMemoryStore;
use crate::ports::{DocumentStore, Lifecycle, StoreError, TaskProcessor};

type SaveHook = Box<dyn Fn(&Task) + Send + Sync>;

/// In-memory store that counts calls and can inject interleaved writes or failures.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    saves: AtomicUsize,
    gets: AtomicUsize,
    interleave: AtomicUsize,
    fail_with: Mutex<Option<StoreError>>,
    on_save: Mutex<Option<SaveHook>>,
}

impl RecordingStore {
    pub async fn with_tasks<const N: usize>(ids: [&str; N]) -> Self {
        let store = Self::default();
        store
            .inner
            .load(ids.map(|id| Task::new(TaskId::new(id), Map::new())))
            .await
            .unwrap();
        store
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// The next `n` saves are preceded by a competing write to the same document.
    pub fn interleave_writes(&self, n: usize) {
        self.interleave.store(n, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, err: StoreError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    /// Called with the document on every save attempt.
    pub fn on_save(&self, hook: impl Fn(&Task) + Send + Sync + 'static) {
        *self.on_save.lock().unwrap() = Some(Box::new(hook));
    }

    pub async fn stored(&self, id: &str) -> Task {
        self.inner.get(&TaskId::new(id)).await.unwrap()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn save(&self, task: &mut Task) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        {
            let hook = self.on_save.lock().unwrap();
            if let Some(hook) = hook.as_ref() {
                hook(task);
            }
        }
        let failure = self.fail_with.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let pending = self.interleave.load(Ordering::SeqCst);
        if pending > 0 {
            self.interleave.store(pending - 1, Ordering::SeqCst);
            let mut other = self.inner.get(task.id()).await?;
            other.set("monitor", "touched");
            self.inner.save(&mut other).await?;
        }

        self.inner.save(task).await
    }

    async fn view(&self, name: &str, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.inner.view(name, limit).await
    }
}

type ProcessFn = dyn Fn(&mut Task) -> Result<(), ProcessError> + Send + Sync;

/// Processor backed by a synchronous closure.
pub struct FnProcessor(Box<ProcessFn>);

impl FnProcessor {
    pub fn new(f: impl Fn(&mut Task) -> Result<(), ProcessError> + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }
}

#[async_trait]
impl TaskProcessor for FnProcessor {
    async fn process(&self, task: &mut Task, _ctx: &ProcessContext) -> Result<(), ProcessError> {
        (self.0)(task)
    }
}

/// Records hook invocations in order.
#[derive(Default, Clone)]
pub struct HookLog(Arc<Mutex<Vec<String>>>);

impl HookLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == name).count()
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Lifecycle for HookLog {
    async fn prepare_env(&self) {
        self.push("prepare_env".into());
    }

    async fn cleanup_env(&self) {
        self.push("cleanup_env".into());
    }

    async fn prepare_run(&self, task: &Task) -> Result<(), ProcessError> {
        self.push(format!("prepare_run:{}", task.id()));
        Ok(())
    }

    async fn cleanup_run(&self, task: &Task) -> Result<(), ProcessError> {
        self.push(format!("cleanup_run:{}", task.id()));
        Ok(())
    }
}
