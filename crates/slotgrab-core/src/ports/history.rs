//! HistoryStore port - 成功履歴の永続化（fire-and-forget）

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::{GrabSuccess, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub member_name: String,
    pub facility_name: String,
    pub department_name: String,
    pub doctor_name: String,
    pub date: String,
    pub time_slot: String,
    pub status: TaskStatus,
    pub recorded_at: DateTime<Local>,
}

impl HistoryRecord {
    pub fn success(result: &GrabSuccess, recorded_at: DateTime<Local>) -> Self {
        Self {
            member_name: result.member_name.clone(),
            facility_name: result.facility_name.clone(),
            department_name: result.department_name.clone(),
            doctor_name: result.doctor_name.clone(),
            date: result.date.clone(),
            time_slot: result.time_slot.clone(),
            status: TaskStatus::Success,
            recorded_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure here must never change task state; callers log and move on.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(&self, record: &HistoryRecord) -> Result<(), StoreError>;
}
