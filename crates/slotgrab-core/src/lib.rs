//! slotgrab-core
//!
//! Core building blocks for the slotgrab appointment grabber.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, config, state, errors, events, task, credentials）
//! - **ports**: 抽象化レイヤー（GrabAttempt, IdentityProvider, HistoryStore, Notifier, Clock など）
//! - **app**: アプリケーションロジック（TaskManager, RetryLoop, StopSignal, Observers）
//! - **auth**: QR ログインのポーリング状態機械
//! - **impls**: ports の具体実装（reqwest, ファイル, tracing）
//! - **config**: TOML 設定とタスク定義ファイル

pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;
