//! LogNotifier - 成功通知をログに出すだけの Notifier

use async_trait::async_trait;
use tracing::info;

use crate::domain::GrabSuccess;
use crate::ports::{NotifyError, Notifier};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_success(&self, result: &GrabSuccess) -> Result<(), NotifyError> {
        info!(
            member = %result.member_name,
            facility = %result.facility_name,
            department = %result.department_name,
            doctor = %result.doctor_name,
            date = %result.date,
            time_slot = %result.time_slot,
            url = result.url.as_deref().unwrap_or(""),
            "reservation confirmed"
        );
        Ok(())
    }
}
