//! StopSignal - 協調的キャンセルトークン
//!
//! - `signal()` は冪等。どのコンテキストから呼んでもよい
//! - 一度立ったフラグは下りない（level-triggered）。再利用せず restart 時に作り直す
//! - 待機（sleep / poll 間隔）は `sleep()` / `cancelled()` 経由で即座に起こされる

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn signal(&self) {
        // send_replace は receiver がいなくても値を更新する
        self.tx.send_replace(true);
    }

    pub fn is_signaled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is set (immediately if it already is).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Err は sender drop のみ。self が sender を持っているので起きない
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless signalled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_signaled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_signaled(),
            _ = self.cancelled() => false,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
