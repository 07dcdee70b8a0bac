//! HTTP booking gateway - 1 回の試行を JSON で外部ゲートウェイに委ねる
//!
//! ページ解析は行わない。TaskConfig を POST し、小さな判定 JSON を読むだけ。
//!
//! ```json
//! {"status": "claimed", "member_name": "...", "date": "2026-03-01", ...}
//! {"status": "unavailable"}
//! {"status": "auth_expired", "message": "login required"}
//! {"status": "error", "message": "...", "retryable": false}
//! ```
//!
//! HTTP 401/403 は認証切れ、429/5xx とタイムアウトは一時エラーとして扱う。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::domain::{
    AttemptError, AttemptOutcome, CredentialSet, GrabSuccess, TaskConfig, TimeBucket,
};
use crate::ports::{AttemptFactory, GrabAttempt};

/// Gateway location. Mirrors the `[booking]` settings section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingEndpoint {
    pub url: String,
    pub request_timeout: Duration,
}

#[derive(Serialize)]
struct ClaimRequest<'a> {
    #[serde(flatten)]
    config: &'a TaskConfig,
    buckets: Vec<TimeBucket>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Verdict {
    Claimed(GrabSuccess),
    Unavailable,
    AuthExpired {
        #[serde(default)]
        message: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default = "retryable_by_default")]
        retryable: bool,
    },
}

fn retryable_by_default() -> bool {
    true
}

/// Map one gateway reply onto the attempt contract.
fn interpret(status: StatusCode, body: &str) -> Result<AttemptOutcome, AttemptError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AttemptError::auth_expired(format!("gateway returned {status}")));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(AttemptError::transient(format!("gateway returned {status}")));
    }
    if !status.is_success() {
        return Err(AttemptError::fatal(format!("gateway returned {status}")));
    }

    let verdict: Verdict = serde_json::from_str(body)
        .map_err(|err| AttemptError::transient(format!("malformed gateway response: {err}")))?;
    match verdict {
        Verdict::Claimed(success) => Ok(AttemptOutcome::Claimed(success)),
        Verdict::Unavailable => Ok(AttemptOutcome::NotYet),
        Verdict::AuthExpired { message } => Err(AttemptError::auth_expired(
            message.unwrap_or_else(|| "login required".into()),
        )),
        Verdict::Error { message, retryable } => {
            let message = message.unwrap_or_else(|| "gateway error".into());
            if retryable {
                Err(AttemptError::transient(message))
            } else {
                Err(AttemptError::fatal(message))
            }
        }
    }
}

pub struct HttpBookingGateway {
    client: Client,
    endpoint: Url,
    cookie: String,
}

impl HttpBookingGateway {
    pub fn new(endpoint: &BookingEndpoint, credentials: &CredentialSet) -> Result<Self, AttemptError> {
        let url = Url::parse(&endpoint.url)
            .map_err(|err| AttemptError::fatal(format!("invalid booking endpoint '{}': {err}", endpoint.url)))?;
        let client = Client::builder()
            .timeout(endpoint.request_timeout)
            .cookie_store(true)
            .build()
            .map_err(|err| AttemptError::fatal(format!("http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: url,
            cookie: credentials.cookie_header(),
        })
    }
}

#[async_trait]
impl GrabAttempt for HttpBookingGateway {
    async fn attempt(&self, config: &TaskConfig) -> Result<AttemptOutcome, AttemptError> {
        let request = ClaimRequest {
            config,
            buckets: config.effective_buckets(),
        };
        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if !self.cookie.is_empty() {
            builder = builder.header(COOKIE, &self.cookie);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| AttemptError::transient(format!("request failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AttemptError::transient(format!("reading response: {err}")))?;
        debug!(%status, bytes = body.len(), "gateway replied");

        interpret(status, &body)
    }
}

/// One gateway client (and cookie store) per task run.
pub struct HttpAttemptFactory {
    endpoint: BookingEndpoint,
    credentials: CredentialSet,
}

impl HttpAttemptFactory {
    pub fn new(endpoint: BookingEndpoint, credentials: CredentialSet) -> Self {
        Self {
            endpoint,
            credentials,
        }
    }
}

impl AttemptFactory for HttpAttemptFactory {
    fn create(&self) -> Result<Box<dyn GrabAttempt>, AttemptError> {
        Ok(Box::new(HttpBookingGateway::new(&self.endpoint, &self.credentials)?))
    }
}
