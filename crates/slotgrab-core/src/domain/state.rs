//! State - タスクと QR セッションの状態
//!
//! # TaskStatus の状態遷移
//! - Pending -> Waiting (start_time あり) | Running (start_time なし)
//! - Waiting -> Running (start_time 到達) | Stopped
//! - Running -> Success | Failed | Stopped
//! - Success / Failed / Stopped は run の終端。restart で再び Waiting/Running へ
//!
//! # PollPhase の状態遷移
//! - Initiated -> AwaitingScan -> Scanned -> Confirmed
//! - どの非終端フェーズからも Expired / Cancelled / Error へ

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a GrabTask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Added, or rejected by admission control.
    Pending,

    /// Admitted, sleeping until its scheduled start time.
    Waiting,

    /// Retry loop is attempting to claim a slot.
    Running,

    Success,
    Failed,
    Stopped,
}

impl TaskStatus {
    /// Terminal for the current run (a restart begins a new run).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    /// Holds a concurrency slot.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Waiting | TaskStatus::Running)
    }

    /// May be admitted by `start_all`.
    pub fn is_startable(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Phase of a QR login handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Initiated,
    AwaitingScan,
    Scanned,
    Confirmed,
    Expired,
    Cancelled,
    Error,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollPhase::Confirmed | PollPhase::Expired | PollPhase::Cancelled | PollPhase::Error
        )
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollPhase::Initiated => "initiated",
            PollPhase::AwaitingScan => "awaiting scan",
            PollPhase::Scanned => "scanned",
            PollPhase::Confirmed => "confirmed",
            PollPhase::Expired => "expired",
            PollPhase::Cancelled => "cancelled",
            PollPhase::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, false, false, true)]
    #[case(TaskStatus::Waiting, false, true, false)]
    #[case(TaskStatus::Running, false, true, false)]
    #[case(TaskStatus::Success, true, false, false)]
    #[case(TaskStatus::Failed, true, false, false)]
    #[case(TaskStatus::Stopped, true, false, true)]
    fn task_status_predicates(
        #[case] status: TaskStatus,
        #[case] terminal: bool,
        #[case] active: bool,
        #[case] startable: bool,
    ) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_active(), active);
        assert_eq!(status.is_startable(), startable);
    }

    #[test]
    fn task_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Waiting).unwrap();
        assert_eq!(json, "\"waiting\"");
    }

    #[test]
    fn only_outcomes_are_terminal_phases() {
        assert!(!PollPhase::Initiated.is_terminal());
        assert!(!PollPhase::AwaitingScan.is_terminal());
        assert!(!PollPhase::Scanned.is_terminal());
        assert!(PollPhase::Confirmed.is_terminal());
        assert!(PollPhase::Expired.is_terminal());
        assert!(PollPhase::Cancelled.is_terminal());
        assert!(PollPhase::Error.is_terminal());
    }
}
