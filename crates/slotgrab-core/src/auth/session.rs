//! QrSession - QR ハンドシェイク 1 回分の状態
//!
//! I/O を持たない。分類済みの応答を受け取り、次に何をすべきかを返すだけ。

use crate::domain::{CredentialSet, LoginId, PollPhase};
use crate::ports::QrTicket;

use super::classify::{INITIAL_LAST, PollResponse};

/// What the poll loop should do after one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep polling on the normal tick.
    Continue,

    /// Confirmed, but no authorization code yet.
    AwaitCode,

    /// Trade this code for credentials.
    Exchange(String),

    /// Too many consecutive not-found responses.
    Expired,
}

#[derive(Debug, Clone)]
pub struct QrSession {
    pub id: LoginId,
    pub phase: PollPhase,
    pub session_token: String,
    /// OAuth state; a redirect may replace the one sent at issuance.
    pub state: Option<String>,
    pub credentials: CredentialSet,

    /// Consecutive not-found responses.
    pub transient_count: u32,

    /// Status code echoed on the next poll.
    pub last: u16,
}

impl QrSession {
    pub fn new(id: LoginId) -> Self {
        Self {
            id,
            phase: PollPhase::Initiated,
            session_token: String::new(),
            state: None,
            credentials: CredentialSet::new(),
            transient_count: 0,
            last: INITIAL_LAST,
        }
    }

    pub fn issued(&mut self, ticket: QrTicket) {
        self.session_token = ticket.session_token;
        self.state = Some(ticket.state).filter(|s| !s.is_empty());
        self.credentials = ticket.credentials;
        self.phase = PollPhase::AwaitingScan;
    }

    /// Fold one response into the session. `budget` is the tolerated run of not-found.
    pub fn observe(&mut self, response: PollResponse, budget: u32) -> Step {
        if let Some(last) = response.next_last() {
            self.last = last;
        }

        match response {
            PollResponse::WaitingForScan => {
                self.transient_count = 0;
                self.phase = PollPhase::AwaitingScan;
                Step::Continue
            }
            PollResponse::Scanned => {
                self.transient_count = 0;
                self.phase = PollPhase::Scanned;
                Step::Continue
            }
            PollResponse::NotFound(_) => {
                self.transient_count += 1;
                if self.transient_count > budget {
                    Step::Expired
                } else {
                    Step::Continue
                }
            }
            PollResponse::Confirmed { code, state } => {
                if state.is_some() {
                    self.state = state;
                }
                match code {
                    Some(code) => Step::Exchange(code),
                    None => Step::AwaitCode,
                }
            }
            PollResponse::Unrecognized(_) => Step::Continue,
        }
    }

    pub fn finish(&mut self, phase: PollPhase) {
        debug_assert!(phase.is_terminal());
        self.phase = phase;
    }
}
