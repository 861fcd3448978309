//! ActorBuilder - RunActor の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store と processor は必須。足りなければ build() が BuildError を返す
//! - source を指定しなければ WorkerConfig から ViewSource / EndlessViewSource を組み立てる

use std::sync::Arc;

use crate::app::{RunActor, RunState};
use crate::config::WorkerConfig;
use crate::domain::TokenReset;
use crate::impls::{EndlessViewSource, ViewSource};
use crate::ports::{DocumentStore, Lifecycle, NoopLifecycle, TaskProcessor, TaskSource};

/// # 使用例
/// ```ignore
/// let mut actor = ActorBuilder::new()
///     .store(store)
///     .processor(MyProcessor)
///     .handle_signals(true)
///     .build()?;
/// let summary = actor.run(StopCriteria::new().with_max_tasks(10)).await?;
/// ```
pub struct ActorBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    processor: Option<Arc<dyn TaskProcessor>>,
    source: Option<Box<dyn TaskSource>>,
    lifecycle: Arc<dyn Lifecycle>,
    config: WorkerConfig,
    handle_signals: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing {0}: set it on the builder before build()")]
    Missing(&'static str),
}

impl ActorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            processor: None,
            source: None,
            lifecycle: Arc::new(NoopLifecycle),
            config: WorkerConfig::default(),
            handle_signals: false,
        }
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn processor(mut self, processor: impl TaskProcessor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Overrides the view source derived from the config.
    pub fn source(mut self, source: impl TaskSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn lifecycle(mut self, lifecycle: impl Lifecycle + 'static) -> Self {
        self.lifecycle = Arc::new(lifecycle);
        self
    }

    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn token_reset(mut self, token_reset: TokenReset) -> Self {
        self.config.token_reset = token_reset;
        self
    }

    /// Install SIGTERM/SIGINT handling when the actor runs.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn build(self) -> Result<RunActor, BuildError> {
        let store = self.store.ok_or(BuildError::Missing("store"))?;
        let processor = self.processor.ok_or(BuildError::Missing("processor"))?;

        let config = self.config;
        let source = match self.source {
            Some(source) => source,
            None if config.endless => Box::new(
                EndlessViewSource::new(Arc::clone(&store))
                    .with_view(config.view.clone())
                    .with_poll_interval(config.poll_interval),
            ),
            None => Box::new(ViewSource::new(Arc::clone(&store)).with_view(config.view.clone())),
        };

        Ok(RunActor::from_parts(
            store,
            source,
            processor,
            self.lifecycle,
            Arc::new(RunState::new(config.token_reset)),
            config.grace,
            self.handle_signals,
        ))
    }
}

impl Default for ActorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
