//! RetryLoop - 1 タスク分の試行サイクル
//!
//! # フロー
//! 1. キャンセル確認
//! 2. attempt カウンタを進めて GrabAttempt を呼ぶ
//! 3. 結果を分類
//!    - Claimed → 成功で終了
//!    - 致命的エラー（AuthExpired / Fatal）→ リトライせず終了
//!    - 上限到達 → MaxRetries で終了
//!    - それ以外 → progress を通知し、固定間隔で sleep（キャンセルで即起床）
//!
//! 空き枠の放出は一瞬かつ予測不能なので、指数バックオフもジッタも使わない。

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::stop::StopSignal;
use crate::domain::{AttemptError, AttemptOutcome, GrabSuccess, TaskConfig, TaskError};
use crate::ports::GrabAttempt;

/// Fixed-cadence retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub interval: Duration,

    /// Attempt ceiling; 0 means unbounded.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn fixed(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
        }
    }

    /// Apply the per-task overrides carried by a TaskConfig.
    pub fn for_task(&self, config: &TaskConfig) -> Self {
        Self {
            interval: config
                .retry_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(self.interval),
            max_retries: config.max_retries.unwrap_or(self.max_retries),
        }
    }

    pub fn ceiling_reached(&self, attempts: u32) -> bool {
        self.max_retries > 0 && attempts >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Self::DEFAULT_INTERVAL, 0)
    }
}

/// How one run of the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Succeeded { payload: GrabSuccess, attempts: u32 },
    Failed { error: TaskError, attempts: u32 },
    Stopped { attempts: u32 },
}

impl LoopOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            LoopOutcome::Succeeded { attempts, .. }
            | LoopOutcome::Failed { attempts, .. }
            | LoopOutcome::Stopped { attempts } => *attempts,
        }
    }
}

/// Hooks called between attempts.
#[async_trait]
pub trait LoopObserver: Send {
    /// Before attempt `n` is issued.
    async fn on_attempt_start(&mut self, _attempt: u32) {}

    /// Attempt `n` did not succeed and the loop will sleep.
    async fn on_progress(&mut self, _attempt: u32, _error: Option<&AttemptError>) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

#[async_trait]
impl LoopObserver for NoopObserver {}

pub struct RetryLoop<'a> {
    attempt: &'a dyn GrabAttempt,
    policy: RetryPolicy,
    stop: StopSignal,
}

impl<'a> RetryLoop<'a> {
    pub fn new(attempt: &'a dyn GrabAttempt, policy: RetryPolicy, stop: StopSignal) -> Self {
        Self {
            attempt,
            policy,
            stop,
        }
    }

    pub async fn run(&self, config: &TaskConfig, observer: &mut dyn LoopObserver) -> LoopOutcome {
        let mut attempts = 0;

        loop {
            if self.stop.is_signaled() {
                return LoopOutcome::Stopped { attempts };
            }

            attempts += 1;
            observer.on_attempt_start(attempts).await;

            // in-flight の attempt は中断しない（完了かタイムアウトまで待つ）
            let error = match self.attempt.attempt(config).await {
                Ok(AttemptOutcome::Claimed(payload)) => {
                    return LoopOutcome::Succeeded { payload, attempts };
                }
                Ok(AttemptOutcome::NotYet) => None,
                Err(err) if err.is_fatal() => {
                    debug!(attempt = attempts, kind = ?err.kind, error = %err, "fatal attempt error");
                    return LoopOutcome::Failed {
                        error: TaskError::Attempt(err),
                        attempts,
                    };
                }
                Err(err) => Some(err),
            };

            if self.policy.ceiling_reached(attempts) {
                return LoopOutcome::Failed {
                    error: TaskError::MaxRetries(self.policy.max_retries),
                    attempts,
                };
            }

            observer.on_progress(attempts, error.as_ref()).await;

            if self.stop.is_signaled() || !self.stop.sleep(self.policy.interval).await {
                return LoopOutcome::Stopped { attempts };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAttempt, sample_config, sample_success};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempt = ScriptedAttempt::new(vec![
            Err(AttemptError::transient("busy")),
            Err(AttemptError::transient("busy")),
            Err(AttemptError::transient("busy")),
            Ok(AttemptOutcome::Claimed(sample_success())),
        ]);
        let lp = RetryLoop::new(&attempt, RetryPolicy::default(), StopSignal::new());

        let outcome = lp.run(&sample_config(), &mut NoopObserver).await;

        assert_eq!(
            outcome,
            LoopOutcome::Succeeded {
                payload: sample_success(),
                attempts: 4
            }
        );
        assert_eq!(attempt.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_after_one_attempt() {
        let attempt = ScriptedAttempt::repeating(Err(AttemptError::auth_expired("session expired")));
        let lp = RetryLoop::new(&attempt, RetryPolicy::default(), StopSignal::new());
        let started = tokio::time::Instant::now();

        let outcome = lp.run(&sample_config(), &mut NoopObserver).await;

        assert!(matches!(
            outcome,
            LoopOutcome::Failed { error: TaskError::Attempt(ref e), attempts: 1 } if e.message == "session expired"
        ));
        assert_eq!(attempt.calls(), 1);
        // sleep していない
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_reports_max_retries() {
        let attempt = ScriptedAttempt::repeating(Ok(AttemptOutcome::NotYet));
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);
        let lp = RetryLoop::new(&attempt, policy, StopSignal::new());

        let outcome = lp.run(&sample_config(), &mut NoopObserver).await;

        assert_eq!(
            outcome,
            LoopOutcome::Failed {
                error: TaskError::MaxRetries(3),
                attempts: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_sleep_exits_within_a_tick() {
        let attempt = ScriptedAttempt::repeating(Err(AttemptError::transient("busy")));
        let stop = StopSignal::new();
        let policy = RetryPolicy::fixed(Duration::from_secs(30), 0);
        let lp = RetryLoop::new(&attempt, policy, stop.clone());

        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.signal();
        });

        let started = tokio::time::Instant::now();
        let outcome = lp.run(&sample_config(), &mut NoopObserver).await;

        assert_eq!(outcome, LoopOutcome::Stopped { attempts: 1 });
        assert_eq!(attempt.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn already_stopped_makes_no_attempt() {
        let attempt = ScriptedAttempt::repeating(Ok(AttemptOutcome::NotYet));
        let stop = StopSignal::new();
        stop.signal();
        let lp = RetryLoop::new(&attempt, RetryPolicy::default(), stop);

        let outcome = lp.run(&sample_config(), &mut NoopObserver).await;

        assert_eq!(outcome, LoopOutcome::Stopped { attempts: 0 });
        assert_eq!(attempt.calls(), 0);
    }

    struct Recording {
        started: Vec<u32>,
        progress: Vec<(u32, Option<String>)>,
    }

    #[async_trait]
    impl LoopObserver for Recording {
        async fn on_attempt_start(&mut self, attempt: u32) {
            self.started.push(attempt);
        }

        async fn on_progress(&mut self, attempt: u32, error: Option<&AttemptError>) {
            self.progress.push((attempt, error.map(|e| e.message.clone())));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_each_attempt() {
        let attempt = ScriptedAttempt::new(vec![
            Ok(AttemptOutcome::NotYet),
            Err(AttemptError::transient("timeout")),
            Ok(AttemptOutcome::Claimed(sample_success())),
        ]);
        let lp = RetryLoop::new(&attempt, RetryPolicy::default(), StopSignal::new());
        let mut rec = Recording {
            started: vec![],
            progress: vec![],
        };

        lp.run(&sample_config(), &mut rec).await;

        assert_eq!(rec.started, vec![1, 2, 3]);
        assert_eq!(rec.progress, vec![(1, None), (2, Some("timeout".to_string()))]);
    }

    #[test]
    fn task_overrides_apply() {
        let mut config = sample_config();
        config.retry_interval_ms = Some(250);
        config.max_retries = Some(7);

        let policy = RetryPolicy::default().for_task(&config);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_retries, 7);

        config.retry_interval_ms = Some(0);
        let policy = RetryPolicy::default().for_task(&config);
        assert_eq!(policy.interval, RetryPolicy::DEFAULT_INTERVAL);
    }
}
