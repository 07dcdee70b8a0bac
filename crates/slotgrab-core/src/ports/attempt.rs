//! Attempt port - 1 回分の「空き確認 → 予約」サイクル
//!
//! ページ解析やフォーム送信の詳細はアダプタ側の責務。
//! RetryLoop はいつ呼ぶか、結果をどう扱うかだけを決める。

use async_trait::async_trait;

use crate::domain::{AttemptError, AttemptOutcome, TaskConfig};

/// Performs one end-to-end check-and-claim cycle against the booking service.
///
/// Implementations must map "session/login invalid" conditions onto
/// `AttemptErrorKind::AuthExpired` so the loop can fail fast.
#[async_trait]
pub trait GrabAttempt: Send + Sync {
    async fn attempt(&self, config: &TaskConfig) -> Result<AttemptOutcome, AttemptError>;
}

/// Builds an independent attempt client per task run.
///
/// Clients (and their cookie jars) are never shared between concurrent runs.
pub trait AttemptFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn GrabAttempt>, AttemptError>;
}
