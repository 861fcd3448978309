//! Ports - 外部コラボレータへの抽象化レイヤー
//!
//! run loop は以下の trait にだけ依存します。
//! 実装（CouchDB クライアント、ビューのイテレータ、ユーザーの処理コード）は差し替え可能です。
//!
//! - **DocumentStore**: 楽観的並行性制御付きのドキュメントストア
//! - **TaskSource**: タスクを 1 件ずつ取り出す遅延シーケンス（有限 / 無限）
//! - **TaskProcessor** / **Lifecycle**: ユーザーが実装する処理とフック

pub mod document_store;
pub mod processor;
pub mod task_source;

pub use self::document_store::{DocumentStore, StoreError};
pub use self::processor::{Lifecycle, NoopLifecycle, TaskProcessor};
pub use self::task_source::{StopPredicate, TaskSource};
