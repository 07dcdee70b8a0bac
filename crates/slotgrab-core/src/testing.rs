//! テスト用のフェイク実装と固定データ

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use ulid::Ulid;

use crate::domain::{
    AttemptError, AttemptOutcome, CredentialSet, GrabSuccess, GrabTask, TaskConfig, TaskId,
};
use crate::ports::{
    AttemptFactory, AuthError, GrabAttempt, HistoryRecord, HistoryStore, IdentityProvider,
    NotifyError, Notifier, QrTicket, StoreError,
};

pub(crate) type AttemptResult = Result<AttemptOutcome, AttemptError>;

pub(crate) fn sample_config() -> TaskConfig {
    let mut config = TaskConfig::new("fac-1", "dept-1", "member-1", vec!["2026-03-01".parse().unwrap()]);
    config.facility_name = "City Hospital".into();
    config.department_name = "Pediatrics".into();
    config.member_name = "Alice".into();
    config
}

pub(crate) fn sample_success() -> GrabSuccess {
    GrabSuccess {
        member_name: "Alice".into(),
        facility_name: "City Hospital".into(),
        department_name: "Pediatrics".into(),
        doctor_name: "Dr. Wu".into(),
        date: "2026-03-01".into(),
        time_slot: "09:00-09:30".into(),
        url: None,
    }
}

pub(crate) fn sample_task() -> GrabTask {
    GrabTask::new(TaskId::from_ulid(Ulid::new()), sample_config(), Local::now())
}

/// Replays scripted results, then falls back to `repeat` (or NotYet).
pub(crate) struct ScriptedAttempt {
    script: Mutex<VecDeque<AttemptResult>>,
    repeat: Option<AttemptResult>,
    panic_on_call: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedAttempt {
    pub(crate) fn new(script: Vec<AttemptResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            panic_on_call: false,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn repeating(result: AttemptResult) -> Self {
        Self {
            repeat: Some(result),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn panicking() -> Self {
        Self {
            panic_on_call: true,
            ..Self::new(Vec::new())
        }
    }

    /// Every call takes `delay` before answering `result`.
    pub(crate) fn slow(delay: Duration, result: AttemptResult) -> Self {
        Self {
            delay: Some(delay),
            ..Self::repeating(result)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were ever running at the same time.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrabAttempt for ScriptedAttempt {
    async fn attempt(&self, _config: &TaskConfig) -> Result<AttemptOutcome, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_call {
            panic!("attempt exploded");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.repeat.clone())
            .unwrap_or(Ok(AttemptOutcome::NotYet))
    }
}

/// Hands out the same scripted attempt to every run.
pub(crate) struct ScriptedFactory {
    attempt: Arc<ScriptedAttempt>,
    fail_create: bool,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub(crate) fn new(attempt: ScriptedAttempt) -> Self {
        Self {
            attempt: Arc::new(attempt),
            fail_create: false,
            created: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new(ScriptedAttempt::new(Vec::new()))
        }
    }

    pub(crate) fn attempt(&self) -> &ScriptedAttempt {
        &self.attempt
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

struct Shared(Arc<ScriptedAttempt>);

#[async_trait]
impl GrabAttempt for Shared {
    async fn attempt(&self, config: &TaskConfig) -> Result<AttemptOutcome, AttemptError> {
        self.0.attempt(config).await
    }
}

impl AttemptFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn GrabAttempt>, AttemptError> {
        if self.fail_create {
            return Err(AttemptError::fatal("client construction failed"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Shared(Arc::clone(&self.attempt))))
    }
}

#[derive(Default)]
pub(crate) struct RecordingHistory {
    pub(crate) records: Mutex<Vec<HistoryRecord>>,
    pub(crate) fail: bool,
}

impl RecordingHistory {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoryStore for RecordingHistory {
    async fn save(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) sent: Mutex<Vec<GrabSuccess>>,
    pub(crate) fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_success(&self, result: &GrabSuccess) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError("webhook unreachable".into()));
        }
        self.sent.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// One scripted long-poll reply.
pub(crate) enum PollReply {
    Body(String),
    NetworkError,
}

impl PollReply {
    pub(crate) fn code(code: u16) -> Self {
        PollReply::Body(format!("window.wx_errcode={code};window.wx_code='';"))
    }

    pub(crate) fn confirmed(auth_code: &str) -> Self {
        PollReply::Body(format!("window.wx_errcode=405;window.wx_code='{auth_code}';"))
    }
}

/// Identity provider that replays poll replies; extra polls see `repeat`.
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<PollReply>>,
    repeat: u16,
    issue_fails: bool,
    exchange: CredentialSet,
    lasts: Mutex<Vec<String>>,
    exchanges: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: Vec<PollReply>, repeat: u16) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat,
            issue_fails: false,
            exchange: CredentialSet::from_cookie_header("access_hash=h1; uid=42", ".booking.test"),
            lasts: Mutex::new(Vec::new()),
            exchanges: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_exchange(mut self, credentials: CredentialSet) -> Self {
        self.exchange = credentials;
        self
    }

    pub(crate) fn failing_issue() -> Self {
        Self {
            issue_fails: true,
            ..Self::new(Vec::new(), 408)
        }
    }

    /// `last` values sent with each poll, in order.
    pub(crate) fn lasts(&self) -> Vec<String> {
        self.lasts.lock().unwrap().clone()
    }

    pub(crate) fn polls(&self) -> usize {
        self.lasts.lock().unwrap().len()
    }

    pub(crate) fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn issue_qr(&self) -> Result<QrTicket, AuthError> {
        if self.issue_fails {
            return Err(AuthError::TokenNotFound);
        }
        Ok(QrTicket {
            image: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
            session_token: "tok-1".into(),
            state: "state-1".into(),
            credentials: CredentialSet::from_cookie_header("pre=1", ".booking.test"),
        })
    }

    async fn poll_once(&self, _session_token: &str, last: &str) -> Result<String, AuthError> {
        self.lasts.lock().unwrap().push(last.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(PollReply::Body(body)) => Ok(body),
            Some(PollReply::NetworkError) => Err(AuthError::Other("connection reset".into())),
            None => Ok(format!("window.wx_errcode={};window.wx_code='';", self.repeat)),
        }
    }

    async fn exchange_code(&self, _code: &str, _state: Option<&str>) -> Result<CredentialSet, AuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(self.exchange.clone())
    }
}
