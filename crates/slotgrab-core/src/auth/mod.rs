//! Auth - QR コードによるログイン
//!
//! - **classify**: long-poll 応答本文の分類（正規表現）
//! - **session**: ハンドシェイク 1 回分の状態遷移（I/O なし）
//! - **machine**: IdentityProvider を駆動するポーリングループ

pub mod classify;
pub mod machine;
pub mod session;

pub use self::classify::{PollResponse, classify, extract_session_token, validate_qr_image};
pub use self::machine::{LoginConfig, LoginObserver, PollingStateMachine, QrOutcome, SilentLogin};
pub use self::session::{QrSession, Step};
