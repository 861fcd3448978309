//! drover-core
//!
//! Worker-side task execution loop: claim a task from a document store,
//! process it, persist the result and stop on time/count/predicate limits.
//! A SIGTERM from the scheduler stops the running subprocess and puts the
//! claimed task back.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Task, TaskId, Revision, TaskStatus, TokenReset, ProcessError）
//! - **ports**: 抽象化レイヤー（DocumentStore, TaskSource, TaskProcessor, Lifecycle）
//! - **app**: 実行ループ（RunActor, ShutdownHandler, ConflictResolvingPersister, StopPolicy）
//! - **impls**: 実装（InMemoryStore, ViewSource, EndlessViewSource, VecSource）
//! - **subprocess**: 追跡可能な子プロセス
//! - **timer**: 経過時間
//! - **config** / **observability** / **error**: 設定・ログ・実行時エラー

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod subprocess;
pub mod timer;

#[cfg(test)]
mod testing;

pub use app::{ActorBuilder, RunActor, RunSummary, StopCriteria};
pub use config::WorkerConfig;
pub use error::RunError;
