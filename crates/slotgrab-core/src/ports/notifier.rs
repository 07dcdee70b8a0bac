//! Notifier port - 成功通知（fire-and-forget）

use async_trait::async_trait;

use crate::domain::GrabSuccess;

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Multi-channel alert sink. Failures are logged by the caller, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, result: &GrabSuccess) -> Result<(), NotifyError>;
}
