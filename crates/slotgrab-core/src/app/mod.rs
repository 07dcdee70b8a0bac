//! App - アプリケーション層
//!
//! ports を組み合わせてタスク実行と QR ログインのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **TaskManagerBuilder**: TaskManager の構築とワイヤリング
//! - **TaskManager**: タスクの登録・入場制御・停止・集計
//! - **RetryLoop**: 1 タスク分の試行サイクル（固定間隔）
//! - **StopSignal**: 協調的キャンセル
//! - **Observers**: ライフサイクルイベントの配送

pub mod builder;
pub mod manager;
pub mod observers;
pub mod retry_loop;
pub mod schedule;
pub mod status;
pub mod stop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, TaskManagerBuilder};
pub use self::manager::{ManagerConfig, TaskManager};
pub use self::observers::{Callback, ObserverResult, Observers, callback};
pub use self::retry_loop::{LoopObserver, LoopOutcome, NoopObserver, RetryLoop, RetryPolicy};
pub use self::schedule::{WAIT_TICK, WaitOutcome, remaining_until, wait_until};
pub use self::status::StatusSummary;
pub use self::stop::StopSignal;
