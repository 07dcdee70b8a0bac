//! Outcome of a single grab attempt.

use serde::{Deserialize, Serialize};

/// Details of a confirmed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrabSuccess {
    pub member_name: String,
    pub facility_name: String,
    pub department_name: String,
    #[serde(default)]
    pub doctor_name: String,
    pub date: String,
    #[serde(default)]
    pub time_slot: String,
    /// Order page returned by the booking service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Result of one successful call to the attempt collaborator.
///
/// Errors travel separately as `AttemptError`, so `(success, payload, err)`
/// becomes `Result<AttemptOutcome, AttemptError>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Reservation confirmed.
    Claimed(GrabSuccess),

    /// Checked, nothing claimable yet.
    NotYet,
}

impl AttemptOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, AttemptOutcome::Claimed(_))
    }
}
