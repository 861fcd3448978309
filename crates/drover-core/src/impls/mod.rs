//! Impls - 開発・テスト用のコラボレータ実装
//!
//! - **InMemoryStore**: リビジョン付きのインメモリ文書ストア
//! - **ViewSource** / **EndlessViewSource**: `todo` ビューからタスクを claim するソース
//! - **VecSource**: 事前に用意したタスクをそのまま流すソース

pub mod inmem_store;
pub mod vec_source;
pub mod view_source;

pub use self::inmem_store::InMemoryStore;
pub use self::vec_source::VecSource;
pub use self::view_source::{EndlessViewSource, ViewSource};
