//! Status - タスク状態の集計ビュー

use serde::{Deserialize, Serialize};

use crate::domain::TaskStatus;

/// Point-in-time counts per status. Not transactional with concurrent start/stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub waiting: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub stopped: usize,
}

impl StatusSummary {
    pub fn from_statuses(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            summary.total += 1;
            match status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Waiting => summary.waiting += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Success => summary.success += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Stopped => summary.stopped += 1,
            }
        }
        summary
    }

    pub fn active(&self) -> usize {
        self.waiting + self.running
    }
}
