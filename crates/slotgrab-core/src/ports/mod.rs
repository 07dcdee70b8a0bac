//! Ports - 抽象化レイヤー
//!
//! 外部システム（予約サービス、ID プロバイダ、履歴 DB、通知チャネル）への
//! インターフェースを trait として定義し、実装の詳細を隠蔽します。
//! 具体実装は `impls` に置く。

pub mod attempt;
pub mod clock;
pub mod credential_store;
pub mod history;
pub mod id_generator;
pub mod identity;
pub mod notifier;

pub use self::attempt::{AttemptFactory, GrabAttempt};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::credential_store::CredentialStore;
pub use self::history::{HistoryRecord, HistoryStore, StoreError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::identity::{AuthError, IdentityProvider, QrTicket};
pub use self::notifier::{NotifyError, Notifier};
