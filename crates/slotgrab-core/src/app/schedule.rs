//! 定時スタートのゲート
//!
//! 今日の HH:MM:SS まで待つ。すでに過ぎていれば即スタート（翌日には回さない）。
//! 1 秒ごとに tick してキャンセルを確認する。

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

use super::stop::StopSignal;
use crate::domain::StartTime;
use crate::ports::Clock;

/// Upper bound on cancellation latency while waiting.
pub const WAIT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    Stopped,
}

/// Time left until today's occurrence of `target`; `None` if it already passed.
pub fn remaining_until(now: DateTime<Local>, target: StartTime) -> Option<Duration> {
    let now = now.naive_local();
    let target = now.date().and_time(target.time());
    if target <= now {
        return None;
    }
    (target - now).to_std().ok()
}

pub async fn wait_until(clock: &dyn Clock, target: StartTime, stop: &StopSignal) -> WaitOutcome {
    let deadline = remaining_until(clock.now(), target).map(|left| Instant::now() + left);

    loop {
        if stop.is_signaled() {
            return WaitOutcome::Stopped;
        }
        let now = Instant::now();
        let Some(deadline) = deadline.filter(|d| *d > now) else {
            return WaitOutcome::Reached;
        };
        stop.sleep((deadline - now).min(WAIT_TICK)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 29, h, m, s).unwrap()
    }

    #[rstest]
    #[case(at(7, 59, 0), "08:00:00", Some(60))]
    #[case(at(8, 0, 0), "08:00:00", None)]
    #[case(at(9, 0, 0), "08:00:00", None)]
    #[case(at(0, 0, 0), "23:59:59", Some(86_399))]
    fn remaining_is_same_day_only(
        #[case] now: DateTime<Local>,
        #[case] target: &str,
        #[case] expected_secs: Option<u64>,
    ) {
        let target: StartTime = target.parse().unwrap();
        assert_eq!(remaining_until(now, target), expected_secs.map(Duration::from_secs));
    }

    #[tokio::test(start_paused = true)]
    async fn past_due_start_does_not_wait() {
        let clock = FixedClock::new(at(10, 0, 0));
        let started = Instant::now();

        let outcome = wait_until(&clock, "08:00:00".parse().unwrap(), &StopSignal::new()).await;

        assert_eq!(outcome, WaitOutcome::Reached);
        assert!(started.elapsed() <= WAIT_TICK);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_target() {
        let clock = FixedClock::new(at(7, 59, 55));
        let started = Instant::now();

        let outcome = wait_until(&clock, "08:00:00".parse().unwrap(), &StopSignal::new()).await;

        assert_eq!(outcome, WaitOutcome::Reached);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_wait() {
        let clock = FixedClock::new(at(7, 0, 0));
        let stop = StopSignal::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.signal();
        });
        let started = Instant::now();

        let outcome = wait_until(&clock, "08:00:00".parse().unwrap(), &stop).await;

        assert_eq!(outcome, WaitOutcome::Stopped);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
