//! Errors - エラー型と分類
//!
//! 文字列マッチではなく ErrorKind で致命/一時を判定します。
//! アダプタ側が上流のマーカー（401, "login required" など）を kind に写像する。

use serde::{Deserialize, Serialize};

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    /// Timeouts, malformed responses, busy upstream. Retried.
    Transient,

    /// Session or credentials are no longer valid. Retrying is pointless.
    AuthExpired,

    /// Anything else the collaborator knows cannot succeed on retry.
    Fatal,
}

impl AttemptErrorKind {
    pub fn is_fatal(self) -> bool {
        !matches!(self, AttemptErrorKind::Transient)
    }
}

/// Error returned by one grab attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct AttemptError {
    pub kind: AttemptErrorKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: AttemptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::Transient, message)
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::AuthExpired, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::Fatal, message)
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

/// Why a run ended without success. Carried by `TaskEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TaskError {
    /// Collaborator reported an auth-fatal or fatal error.
    #[error("{}", attempt_reason(.0))]
    Attempt(AttemptError),

    /// Attempt ceiling reached with no success.
    #[error("max retries reached ({0})")]
    MaxRetries(u32),

    /// The run routine itself failed (panic, client construction error, ...).
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

// 認証切れは再ログインを促す文言にする
fn attempt_reason(err: &AttemptError) -> String {
    match err.kind {
        AttemptErrorKind::AuthExpired => format!("login expired, re-authenticate: {}", err.message),
        _ => err.message.clone(),
    }
}
