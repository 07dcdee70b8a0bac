//! IdentityProvider port - QR ハンドシェイクのネットワーク原始操作
//!
//! PollingStateMachine はこの 3 つだけを駆動する:
//! 1. issue_qr: QR 画像とセッショントークンを取得
//! 2. poll_once: long-poll を 1 回発行し、生のレスポンス本文を返す
//! 3. exchange_code: 認可コードを credential に交換

use async_trait::async_trait;

use crate::domain::CredentialSet;

/// Freshly issued QR code.
#[derive(Debug, Clone)]
pub struct QrTicket {
    pub image: Vec<u8>,
    pub session_token: String,
    /// OAuth `state` sent with the issuance request.
    pub state: String,
    /// Cookies collected while issuing.
    pub credentials: CredentialSet,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session token not found in QR page")]
    TokenNotFound,

    #[error("QR payload is not a JPEG or PNG image")]
    InvalidImage,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn issue_qr(&self) -> Result<QrTicket, AuthError>;

    /// `last` echoes the previous status code; the upstream serves stale
    /// responses without it.
    async fn poll_once(&self, session_token: &str, last: &str) -> Result<String, AuthError>;

    /// Follow the callback and propagation pages, then return every cookie
    /// collected along the way.
    async fn exchange_code(&self, code: &str, state: Option<&str>) -> Result<CredentialSet, AuthError>;
}
