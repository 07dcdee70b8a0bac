//! PollingStateMachine - QR ログインのハンドシェイクを駆動する
//!
//! # フロー
//! 1. issue_qr で画像とトークンを取得し、observer に画像を渡す
//! 2. 1 tick ごとに poll_once → classify → QrSession::observe
//! 3. 確認済み + code があれば exchange_code。必須 cookie が揃えば CONFIRMED
//!
//! 全体の時間予算（既定 300 秒）を超えたら EXPIRED。
//! ネットワークエラーは連続 not-found に数えず、少し待って再試行する。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use super::classify::{classify, validate_qr_image};
use super::session::{QrSession, Step};
use crate::app::StopSignal;
use crate::domain::{CredentialSet, LoginId, PollPhase};
use crate::ports::IdentityProvider;

/// Handshake knobs. Mirrors the `[login]` settings section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    /// Wall-clock budget for the whole handshake.
    pub timeout: Duration,

    pub poll_interval: Duration,

    /// Consecutive not-found responses tolerated before EXPIRED.
    pub transient_budget: u32,

    /// Pause after a network error.
    pub network_retry: Duration,

    /// Cookie that proves the login completed.
    pub required_credential: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            transient_budget: 60,
            network_retry: Duration::from_secs(2),
            required_credential: "access_hash".into(),
        }
    }
}

/// UI hooks. Called from the polling task; keep them short.
pub trait LoginObserver: Send + Sync {
    fn on_qr_image(&self, _image: &[u8]) {}

    fn on_status(&self, _phase: PollPhase, _message: &str) {}
}

/// Observer that ignores everything.
pub struct SilentLogin;

impl LoginObserver for SilentLogin {}

/// Terminal result of one handshake.
#[derive(Debug, Clone)]
pub struct QrOutcome {
    pub id: LoginId,
    pub phase: PollPhase,
    pub reason: String,
    /// Only populated on CONFIRMED.
    pub credentials: CredentialSet,
}

impl QrOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.phase == PollPhase::Confirmed
    }
}

pub struct PollingStateMachine {
    provider: Arc<dyn IdentityProvider>,
    config: LoginConfig,
    stop: StopSignal,
    id: LoginId,
}

impl PollingStateMachine {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: LoginConfig, id: LoginId) -> Self {
        Self {
            provider,
            config,
            stop: StopSignal::new(),
            id,
        }
    }

    /// Handle for cancelling from another task.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn cancel(&self) {
        self.stop.signal();
    }

    /// Run on its own task; a panic becomes an ERROR outcome.
    pub async fn run_supervised(self: Arc<Self>, observer: Arc<dyn LoginObserver>) -> QrOutcome {
        let machine = Arc::clone(&self);
        let hooks = Arc::clone(&observer);
        let worker = tokio::spawn(async move { machine.run(hooks.as_ref()).await });

        match worker.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(login_id = %self.id, error = %err, "login handshake crashed");
                let reason = format!("login failed: {err}");
                observer.on_status(PollPhase::Error, &reason);
                QrOutcome {
                    id: self.id,
                    phase: PollPhase::Error,
                    reason,
                    credentials: CredentialSet::new(),
                }
            }
        }
    }

    pub async fn run(&self, observer: &dyn LoginObserver) -> QrOutcome {
        let mut session = QrSession::new(self.id);

        let ticket = match self.provider.issue_qr().await {
            Ok(ticket) => ticket,
            Err(err) => {
                return self.finish(session, PollPhase::Error, format!("failed to get QR code: {err}"), observer);
            }
        };
        if let Err(err) = validate_qr_image(&ticket.image) {
            return self.finish(session, PollPhase::Error, format!("failed to get QR code: {err}"), observer);
        }

        observer.on_qr_image(&ticket.image);
        session.issued(ticket);
        info!(login_id = %self.id, "QR code issued");
        observer.on_status(session.phase, &session.phase.to_string());

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if self.stop.is_signaled() {
                return self.finish(session, PollPhase::Cancelled, "cancelled".into(), observer);
            }
            if Instant::now() >= deadline {
                return self.finish(session, PollPhase::Expired, "QR code expired".into(), observer);
            }

            let last = session.last.to_string();
            let polled = tokio::select! {
                polled = timeout_at(deadline, self.provider.poll_once(&session.session_token, &last)) => polled,
                _ = self.stop.cancelled() => continue,
            };
            let body = match polled {
                Ok(Ok(body)) => body,
                Ok(Err(err)) => {
                    warn!(login_id = %self.id, error = %err, "poll failed, retrying");
                    self.stop.sleep(until_deadline(self.config.network_retry, deadline)).await;
                    continue;
                }
                // 予算切れ。次の周回で EXPIRED になる
                Err(_) => continue,
            };

            let response = classify(&body);
            debug!(login_id = %self.id, status = response.status_code(), "poll");
            let before = session.phase;
            match session.observe(response, self.config.transient_budget) {
                Step::Continue => {
                    if session.phase != before {
                        info!(login_id = %self.id, phase = %session.phase, "login progressed");
                        observer.on_status(session.phase, &session.phase.to_string());
                    }
                }
                Step::AwaitCode => {
                    observer.on_status(session.phase, "confirmed, waiting for code");
                }
                Step::Expired => {
                    return self.finish(session, PollPhase::Expired, "QR code expired or not found".into(), observer);
                }
                Step::Exchange(code) => {
                    observer.on_status(session.phase, "logging in");
                    return self.exchange(session, &code, observer).await;
                }
            }

            self.stop.sleep(until_deadline(self.config.poll_interval, deadline)).await;
        }
    }

    async fn exchange(&self, mut session: QrSession, code: &str, observer: &dyn LoginObserver) -> QrOutcome {
        let credentials = match self.provider.exchange_code(code, session.state.as_deref()).await {
            Ok(credentials) => credentials,
            Err(err) => {
                return self.finish(session, PollPhase::Error, format!("login failed: {err}"), observer);
            }
        };

        if credentials.is_empty() {
            return self.finish(session, PollPhase::Error, "no credentials received".into(), observer);
        }
        if !credentials.contains(&self.config.required_credential) {
            let reason = format!("login incomplete: missing {}", self.config.required_credential);
            return self.finish(session, PollPhase::Error, reason, observer);
        }

        session.credentials = credentials;
        self.finish(session, PollPhase::Confirmed, "login succeeded".into(), observer)
    }

    fn finish(&self, mut session: QrSession, phase: PollPhase, reason: String, observer: &dyn LoginObserver) -> QrOutcome {
        session.finish(phase);
        if phase == PollPhase::Confirmed {
            info!(login_id = %self.id, credentials = session.credentials.len(), "login confirmed");
        } else {
            warn!(login_id = %self.id, %phase, reason = %reason, "login ended");
        }
        observer.on_status(phase, &reason);

        let credentials = if phase == PollPhase::Confirmed {
            session.credentials
        } else {
            CredentialSet::new()
        };
        QrOutcome {
            id: session.id,
            phase,
            reason,
            credentials,
        }
    }
}

/// `pause`, but never past `deadline`.
fn until_deadline(pause: Duration, deadline: Instant) -> Duration {
    pause.min(deadline.saturating_duration_since(Instant::now()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::testing::{PollReply, ScriptedProvider};
    use ulid::Ulid;

    #[derive(Default)]
    struct Recorder {
        images: Mutex<usize>,
        statuses: Mutex<Vec<(PollPhase, String)>>,
    }

    impl Recorder {
        fn messages(&self) -> Vec<String> {
            self.statuses.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
        }
    }

    impl LoginObserver for Recorder {
        fn on_qr_image(&self, _image: &[u8]) {
            *self.images.lock().unwrap() += 1;
        }

        fn on_status(&self, phase: PollPhase, message: &str) {
            self.statuses.lock().unwrap().push((phase, message.to_string()));
        }
    }

    fn machine(provider: Arc<ScriptedProvider>, config: LoginConfig) -> PollingStateMachine {
        PollingStateMachine::new(provider, config, LoginId::from_ulid(Ulid::new()))
    }

    fn not_found(n: usize) -> Vec<PollReply> {
        (0..n).map(|_| PollReply::code(404)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_after_scan() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                PollReply::code(408),
                PollReply::code(408),
                PollReply::code(201),
                PollReply::confirmed("auth-code"),
            ],
            408,
        ));
        let recorder = Recorder::default();

        let outcome = machine(provider.clone(), LoginConfig::default()).run(&recorder).await;

        assert!(outcome.is_confirmed());
        assert_eq!(outcome.credentials.get("access_hash"), Some("h1"));
        assert_eq!(*recorder.images.lock().unwrap(), 1);
        assert_eq!(
            recorder.messages(),
            vec!["awaiting scan", "scanned", "logging in", "login succeeded"]
        );
        assert_eq!(provider.lasts(), vec!["404", "408", "408", "201"]);
        assert_eq!(provider.exchanges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sixty_one_not_found_expires() {
        let provider = Arc::new(ScriptedProvider::new(not_found(61), 408));

        let outcome = machine(provider.clone(), LoginConfig::default()).run(&SilentLogin).await;

        assert_eq!(outcome.phase, PollPhase::Expired);
        assert_eq!(provider.polls(), 61);
        assert!(outcome.credentials.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_after_fifty_nine_not_found_keeps_going() {
        let mut replies = not_found(59);
        replies.push(PollReply::code(201));
        replies.extend(not_found(60));
        replies.push(PollReply::confirmed("late"));
        let provider = Arc::new(ScriptedProvider::new(replies, 201));

        let outcome = machine(provider.clone(), LoginConfig::default()).run(&SilentLogin).await;

        assert!(outcome.is_confirmed());
        assert_eq!(provider.polls(), 121);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_awaiting_scan_expires_on_budget() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new(), 408));
        let config = LoginConfig {
            timeout: Duration::from_secs(2),
            ..LoginConfig::default()
        };
        let recorder = Recorder::default();
        let started = Instant::now();

        let outcome = machine(provider.clone(), config).run(&recorder).await;

        assert_eq!(outcome.phase, PollPhase::Expired);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(provider.polls(), 2);
        assert_eq!(recorder.statuses.lock().unwrap().last().unwrap().0, PollPhase::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_do_not_count_as_not_found() {
        let mut replies = not_found(60);
        replies.push(PollReply::NetworkError);
        replies.push(PollReply::NetworkError);
        replies.push(PollReply::confirmed("c"));
        let provider = Arc::new(ScriptedProvider::new(replies, 408));

        let outcome = machine(provider.clone(), LoginConfig::default()).run(&SilentLogin).await;

        assert!(outcome.is_confirmed());
        assert_eq!(provider.polls(), 63);
    }

    #[tokio::test(start_paused = true)]
    async fn network_retry_stops_at_deadline() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![PollReply::code(408), PollReply::code(408), PollReply::NetworkError],
            408,
        ));
        let config = LoginConfig {
            timeout: Duration::from_secs(3),
            ..LoginConfig::default()
        };
        let started = Instant::now();

        let outcome = machine(provider.clone(), config).run(&SilentLogin).await;

        assert_eq!(outcome.phase, PollPhase::Expired);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(provider.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_without_code_keeps_polling() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![PollReply::code(201), PollReply::code(405), PollReply::confirmed("c2")],
            408,
        ));
        let recorder = Recorder::default();

        let outcome = machine(provider, LoginConfig::default()).run(&recorder).await;

        assert!(outcome.is_confirmed());
        assert!(recorder.messages().contains(&"confirmed, waiting for code".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_required_cookie_is_an_error() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![PollReply::confirmed("c")], 408)
                .with_exchange(CredentialSet::from_cookie_header("uid=42", ".booking.test")),
        );

        let outcome = machine(provider, LoginConfig::default()).run(&SilentLogin).await;

        assert_eq!(outcome.phase, PollPhase::Error);
        assert_eq!(outcome.reason, "login incomplete: missing access_hash");
        assert!(outcome.credentials.is_empty());
    }

    #[tokio::test]
    async fn issue_failure_is_an_error() {
        let provider = Arc::new(ScriptedProvider::failing_issue());

        let outcome = machine(provider.clone(), LoginConfig::default()).run(&SilentLogin).await;

        assert_eq!(outcome.phase, PollPhase::Error);
        assert!(outcome.reason.starts_with("failed to get QR code"));
        assert_eq!(provider.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_within_a_tick() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new(), 408));
        let machine = Arc::new(machine(provider, LoginConfig::default()));
        let stop = machine.stop_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            stop.signal();
        });
        let started = Instant::now();

        let outcome = machine.run_supervised(Arc::new(SilentLogin)).await;

        assert_eq!(outcome.phase, PollPhase::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
