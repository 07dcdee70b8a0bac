//! Impls - ports の具体実装
//!
//! # 含まれる実装
//! - **WechatQrProvider**: WeChat open-platform の QR ログイン
//! - **HttpAttemptFactory / HttpBookingGateway**: JSON ゲートウェイへの 1 回の試行
//! - **JsonlHistory / NullHistory**: 成功履歴
//! - **CookieFile**: ログイン cookie の保存
//! - **LogNotifier**: tracing に出すだけの通知

pub mod cookie_file;
pub mod history_file;
pub mod http_attempt;
pub mod notify_log;
pub mod wechat;

// 主要な型を再エクスポート
pub use self::cookie_file::CookieFile;
pub use self::history_file::{JsonlHistory, NullHistory};
pub use self::http_attempt::{BookingEndpoint, HttpAttemptFactory, HttpBookingGateway};
pub use self::notify_log::LogNotifier;
pub use self::wechat::{WechatEndpoints, WechatQrProvider};
