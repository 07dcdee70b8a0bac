//! GrabTask: config + lifecycle state of one grab task.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::config::TaskConfig;
use super::ids::TaskId;
use super::outcome::GrabSuccess;
use super::state::TaskStatus;

/// Value object for one grab task.
///
/// Design:
/// - This is the "single source of truth" for task state inside the manager.
/// - All state transitions happen here; the manager only decides *when*.
/// - Observers receive clones (snapshots), never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrabTask {
    pub id: TaskId,
    pub config: TaskConfig,
    pub status: TaskStatus,

    /// Attempts in the current run (reset on restart / on entering Running).
    pub attempts: u32,

    /// Cleared at the start of every attempt.
    pub last_error: Option<String>,

    /// Only set on Success.
    pub result: Option<GrabSuccess>,

    pub created_at: DateTime<Local>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl GrabTask {
    pub fn new(id: TaskId, config: TaskConfig, now: DateTime<Local>) -> Self {
        Self {
            id,
            config,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            result: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn name(&self) -> String {
        self.config.display_name()
    }

    /// Configuration this task was built from (identity/status excluded).
    pub fn to_config(&self) -> TaskConfig {
        self.config.clone()
    }

    /// Admitted: clear the previous run and enter Waiting or Running.
    pub fn begin_run(&mut self, now: DateTime<Local>) {
        self.status = if self.config.start_time.is_some() {
            TaskStatus::Waiting
        } else {
            TaskStatus::Running
        };
        self.attempts = 0;
        self.last_error = None;
        self.result = None;
        self.started_at = Some(now);
        self.finished_at = None;
    }

    /// Waiting -> Running once the scheduled start is reached.
    pub fn enter_running(&mut self) -> bool {
        if self.status != TaskStatus::Waiting {
            return false;
        }
        self.status = TaskStatus::Running;
        self.attempts = 0;
        self.last_error = None;
        true
    }

    /// Increment attempts and clear the previous error.
    pub fn start_attempt(&mut self) {
        self.attempts += 1;
        self.last_error = None;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn mark_succeeded(&mut self, result: GrabSuccess, now: DateTime<Local>) -> bool {
        if !self.finish(TaskStatus::Success, now) {
            return false;
        }
        self.result = Some(result);
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Local>) -> bool {
        if !self.finish(TaskStatus::Failed, now) {
            return false;
        }
        self.last_error = Some(error.into());
        true
    }

    pub fn mark_stopped(&mut self, now: DateTime<Local>) -> bool {
        self.finish(TaskStatus::Stopped, now)
    }

    /// Terminal transition; finish time is recorded at most once per run.
    fn finish(&mut self, status: TaskStatus, now: DateTime<Local>) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::StartTime;
    use ulid::Ulid;

    fn config() -> TaskConfig {
        TaskConfig::new("u", "d", "m", vec!["2026-03-01".parse().unwrap()])
    }

    fn task(config: TaskConfig) -> GrabTask {
        GrabTask::new(TaskId::from_ulid(Ulid::new()), config, Local::now())
    }

    #[test]
    fn to_config_round_trips() {
        let mut original = config().with_name("night shift");
        original.doctor_ids = vec!["doc-1".into(), "doc-2".into()];
        original.preferred_hours = vec!["09:00-09:30".into()];
        original.max_retries = Some(10);

        let first = task(original.clone());
        let second = task(first.to_config());

        assert_eq!(second.to_config(), original);
        assert_ne!(first.id, second.id);
        assert_eq!(second.status, TaskStatus::Pending);
    }

    #[test]
    fn begin_run_without_start_time_goes_running() {
        let mut t = task(config());
        t.begin_run(Local::now());
        assert_eq!(t.status, TaskStatus::Running);
        assert!(t.started_at.is_some());
    }

    #[test]
    fn begin_run_with_start_time_goes_waiting() {
        let start: StartTime = "08:00:00".parse().unwrap();
        let mut t = task(config().with_start_time(start));
        t.begin_run(Local::now());
        assert_eq!(t.status, TaskStatus::Waiting);
        assert!(t.enter_running());
        assert_eq!(t.status, TaskStatus::Running);
        assert!(!t.enter_running());
    }

    #[test]
    fn finish_is_recorded_once() {
        let mut t = task(config());
        t.begin_run(Local::now());
        t.start_attempt();

        let first = Local::now();
        assert!(t.mark_stopped(first));
        assert!(!t.mark_failed("late", Local::now()));
        assert_eq!(t.status, TaskStatus::Stopped);
        assert_eq!(t.finished_at, Some(first));
        assert_eq!(t.last_error, None);
    }

    #[test]
    fn restart_clears_previous_run() {
        let mut t = task(config());
        t.begin_run(Local::now());
        t.start_attempt();
        t.start_attempt();
        t.mark_failed("boom", Local::now());

        t.begin_run(Local::now());
        assert_eq!(t.attempts, 0);
        assert_eq!(t.last_error, None);
        assert_eq!(t.finished_at, None);
        assert_eq!(t.status, TaskStatus::Running);
    }

    #[test]
    fn start_attempt_clears_last_error() {
        let mut t = task(config());
        t.begin_run(Local::now());
        t.start_attempt();
        t.record_error("busy");
        t.start_attempt();
        assert_eq!(t.attempts, 2);
        assert_eq!(t.last_error, None);
    }
}
