//! long-poll 応答本文の分類
//!
//! 本文は `window.wx_errcode=408;window.wx_code='';` のような JS 断片。
//! errcode が無い（= 0）のに code か redirect があれば確認済み（405）とみなす。

use std::sync::LazyLock;

use regex::Regex;

use crate::ports::AuthError;

static ERRCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"wx_errcode\s*=\s*(\d+)").unwrap());
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"wx_code\s*=\s*['"]([^'"]*)['"]"#).unwrap());
static REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.location(?:\.href|\.replace)?\s*\(?\s*=?\s*['"]([^'"]+)['"]\)?"#).unwrap()
});
static SESSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/connect/qrcode/([A-Za-z0-9_-]+)").unwrap());

pub const WAITING_FOR_SCAN: u16 = 408;
pub const SCANNED: u16 = 201;
pub const CONFIRMED: u16 = 405;
pub const NOT_FOUND: u16 = 404;
pub const GONE: u16 = 402;

/// `last` sent with the very first poll.
pub const INITIAL_LAST: u16 = NOT_FOUND;

/// One classified long-poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    WaitingForScan,
    Scanned,
    /// `code` is `None` when the upstream confirmed but did not hand one out yet.
    Confirmed {
        code: Option<String>,
        state: Option<String>,
    },
    /// 404 / 402: usually transient, sometimes really expired.
    NotFound(u16),
    Unrecognized(u16),
}

impl PollResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            PollResponse::WaitingForScan => WAITING_FOR_SCAN,
            PollResponse::Scanned => SCANNED,
            PollResponse::Confirmed { .. } => CONFIRMED,
            PollResponse::NotFound(code) | PollResponse::Unrecognized(code) => *code,
        }
    }

    /// Value to echo as `last` on the next poll, if this response updates it.
    pub fn next_last(&self) -> Option<u16> {
        match self {
            PollResponse::Unrecognized(_) => None,
            other => Some(other.status_code()),
        }
    }
}

pub fn classify(body: &str) -> PollResponse {
    let errcode = ERRCODE
        .captures(body)
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .unwrap_or(0);
    let mut code = CODE
        .captures(body)
        .map(|caps| caps[1].to_string())
        .filter(|code| !code.is_empty());
    let redirect = REDIRECT.captures(body).map(|caps| caps[1].to_string());

    let errcode = if errcode == 0 && (code.is_some() || redirect.is_some()) {
        CONFIRMED
    } else {
        errcode
    };

    match errcode {
        WAITING_FOR_SCAN => PollResponse::WaitingForScan,
        SCANNED => PollResponse::Scanned,
        CONFIRMED => {
            let mut state = None;
            if let Some(redirect) = redirect.as_deref().and_then(|raw| url::Url::parse(raw).ok()) {
                for (key, value) in redirect.query_pairs() {
                    match key.as_ref() {
                        "code" if code.is_none() && !value.is_empty() => code = Some(value.into_owned()),
                        "state" if !value.is_empty() => state = Some(value.into_owned()),
                        _ => {}
                    }
                }
            }
            PollResponse::Confirmed { code, state }
        }
        NOT_FOUND | GONE => PollResponse::NotFound(errcode),
        other => PollResponse::Unrecognized(other),
    }
}

/// Pull the session token out of the QR page HTML.
pub fn extract_session_token(html: &str) -> Result<String, AuthError> {
    SESSION_TOKEN
        .captures(html)
        .map(|caps| caps[1].to_string())
        .ok_or(AuthError::TokenNotFound)
}

/// Accept JPEG or PNG only.
pub fn validate_qr_image(bytes: &[u8]) -> Result<(), AuthError> {
    const JPEG: &[u8] = &[0xff, 0xd8];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G'];
    if bytes.starts_with(JPEG) || bytes.starts_with(PNG) {
        Ok(())
    } else {
        Err(AuthError::InvalidImage)
    }
}
