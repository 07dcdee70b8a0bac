//! TaskConfig - 抢号タスクの入力設定
//!
//! 作成後は不変。GrabTask は自身の TaskConfig を保持し、
//! `GrabTask::to_config()` でそのまま取り出せます。

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Time-of-day bucket of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Am,
    Pm,
}

impl TimeBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Am => "am",
            TimeBucket::Pm => "pm",
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Same-day wall-clock start time, written as `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StartTime(NaiveTime);

impl StartTime {
    pub const FORMAT: &'static str = "%H:%M:%S";

    pub fn new(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for StartTime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), Self::FORMAT)
            .map(StartTime)
            .map_err(|_| ConfigError::InvalidStartTime(s.to_string()))
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for StartTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Configuration-fatal errors: rejected at `add_task`, never reach the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one target date is required")]
    NoDates,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid start time '{0}', expected HH:MM:SS")]
    InvalidStartTime(String),
}

/// Immutable description of what to grab and for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub name: String,

    pub facility_id: String,
    #[serde(default)]
    pub facility_name: String,

    pub department_id: String,
    #[serde(default)]
    pub department_name: String,

    /// Empty means "any doctor".
    #[serde(default)]
    pub doctor_ids: Vec<String>,

    pub member_id: String,
    #[serde(default)]
    pub member_name: String,

    pub dates: Vec<NaiveDate>,

    /// Empty means both buckets.
    #[serde(default)]
    pub time_buckets: Vec<TimeBucket>,

    /// Ordered preference among the hour labels the booking service offers.
    #[serde(default)]
    pub preferred_hours: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<StartTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl TaskConfig {
    pub fn new(
        facility_id: impl Into<String>,
        department_id: impl Into<String>,
        member_id: impl Into<String>,
        dates: Vec<NaiveDate>,
    ) -> Self {
        Self {
            name: String::new(),
            facility_id: facility_id.into(),
            facility_name: String::new(),
            department_id: department_id.into(),
            department_name: String::new(),
            doctor_ids: Vec::new(),
            member_id: member_id.into(),
            member_name: String::new(),
            dates,
            time_buckets: Vec::new(),
            preferred_hours: Vec::new(),
            start_time: None,
            retry_interval_ms: None,
            max_retries: None,
        }
    }

    pub fn with_start_time(mut self, start_time: StartTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fail-fast 検証: 日付なし・対象リソースなしは実行前に弾く
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.facility_id.trim().is_empty() {
            return Err(ConfigError::MissingField("facility_id"));
        }
        if self.department_id.trim().is_empty() {
            return Err(ConfigError::MissingField("department_id"));
        }
        if self.member_id.trim().is_empty() {
            return Err(ConfigError::MissingField("member_id"));
        }
        if self.dates.is_empty() {
            return Err(ConfigError::NoDates);
        }
        Ok(())
    }

    /// Buckets to query; an empty selection means both.
    pub fn effective_buckets(&self) -> Vec<TimeBucket> {
        if self.time_buckets.is_empty() {
            vec![TimeBucket::Am, TimeBucket::Pm]
        } else {
            self.time_buckets.clone()
        }
    }

    /// Name shown in logs and summaries.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        let who = if self.member_name.is_empty() {
            self.member_id.as_str()
        } else {
            self.member_name.as_str()
        };
        format!("task-{who}")
    }
}
