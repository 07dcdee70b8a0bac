//! TaskManagerBuilder - TaskManager の構築とワイヤリング
//!
//! # 方針
//! - グローバルなシングルトンは持たない。依存はすべてここで明示的に渡す
//! - 起動時検証（Fail-fast）: attempt factory 未設定・上限 0 は build() で弾く
//! - 履歴・通知・時計・ID 生成は省略可能（既定の実装を使う）

use std::sync::Arc;

use super::manager::{Collaborators, ManagerConfig, TaskManager};
use super::retry_loop::RetryPolicy;
use crate::impls::{LogNotifier, NullHistory};
use crate::ports::{AttemptFactory, Clock, HistoryStore, IdGenerator, Notifier, SystemClock, UlidGenerator};

/// Wires a [`TaskManager`] from its ports.
///
/// # 使用例
/// ```ignore
/// let manager = TaskManagerBuilder::new()
///     .attempt_factory(Arc::new(HttpAttemptFactory::new(settings.booking, credentials)))
///     .history(Arc::new(JsonlHistory::new("history.jsonl")))
///     .max_concurrent(3)
///     .build()?;
/// ```
pub struct TaskManagerBuilder {
    factory: Option<Arc<dyn AttemptFactory>>,
    history: Option<Arc<dyn HistoryStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: ManagerConfig,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("an attempt factory is required to run tasks")]
    MissingAttemptFactory,

    #[error("max_concurrent must be at least 1")]
    InvalidConcurrency,
}

impl TaskManagerBuilder {
    pub fn new() -> Self {
        Self {
            factory: None,
            history: None,
            notifier: None,
            clock: None,
            ids: None,
            config: ManagerConfig::default(),
        }
    }

    pub fn attempt_factory(mut self, factory: Arc<dyn AttemptFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent = max_concurrent;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<TaskManager, BuildError> {
        let factory = self.factory.ok_or(BuildError::MissingAttemptFactory)?;
        if self.config.max_concurrent == 0 {
            return Err(BuildError::InvalidConcurrency);
        }

        let parts = Collaborators {
            factory,
            history: self.history.unwrap_or_else(|| Arc::new(NullHistory)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ids: self
                .ids
                .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock))),
        };
        Ok(TaskManager::new(self.config, parts))
    }
}

impl Default for TaskManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
