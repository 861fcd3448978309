//! App - アプリケーション層
//!
//! ports を組み合わせてワーカーの実行ループを実装します。
//!
//! # 主要コンポーネント
//! - **ActorBuilder**: RunActor の構築とワイヤリング
//! - **RunActor**: claim→process→persist→stop 判定のメインループ
//! - **RunState**: ループとシャットダウンハンドラが共有する状態
//! - **ShutdownHandler**: シグナル受信時のサブプロセス停止とトークン巻き戻し
//! - **ConflictResolvingPersister**: 競合をリトライで解消する保存
//! - **StopPolicy**: 停止条件の評価

pub mod actor;
pub mod builder;
pub mod persister;
pub mod run_state;
pub mod shutdown;
pub mod status;
pub mod stop_policy;
mod unwind;

// 主要な型を再エクスポート
pub use self::actor::RunActor;
pub use self::builder::{ActorBuilder, BuildError};
pub use self::persister::ConflictResolvingPersister;
pub use self::run_state::{ProcessContext, RunState};
pub use self::shutdown::{
    DEFAULT_GRACE, ShutdownHandler, ShutdownReport, ShutdownSignal, SubprocessOutcome,
    install_shutdown_handler,
};
pub use self::status::{RunSummary, StatusCounts};
pub use self::stop_policy::{StopCriteria, StopPolicy, StopReason};
