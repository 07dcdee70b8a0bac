//! Clock port - 時刻の抽象化
//!
//! - SystemClock: 本番用（ローカル時刻）
//! - FixedClock: テスト用（常に同じ時刻を返す）
//!
//! 定時スタートは「今日の HH:MM:SS」で判定するので、ローカル時刻を扱う。

use chrono::{DateTime, Local};

/// Clock は現在時刻を提供
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Local>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.now
    }
}
