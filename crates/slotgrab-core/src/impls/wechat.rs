//! WeChat open-platform QR login over reqwest
//!
//! - issue_qr: qrconnect ページからトークンを抜き出し、QR 画像を取得
//! - poll_once: lp.open.weixin.qq.com の long-poll を 1 回
//! - exchange_code: コールバック → トップ → マイページを辿って cookie を集める
//!
//! exchange は毎回新しい cookie jar で行う（前回ログインの残骸を持ち込まない）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER};
use tracing::debug;
use url::Url;

use crate::auth::{extract_session_token, validate_qr_image};
use crate::domain::CredentialSet;
use crate::ports::{AuthError, IdentityProvider, QrTicket};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Where the handshake talks to. Defaults target the production booking site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WechatEndpoints {
    pub app_id: String,
    pub redirect_uri: String,
    pub connect_base: String,
    pub long_poll_base: String,
    /// Visited after the callback so the booking site sets its cookies.
    pub propagation_pages: Vec<String>,
    /// Hosts whose cookies are collected after the exchange.
    pub cookie_hosts: Vec<String>,
    pub request_timeout: Duration,
    /// The long-poll holds the connection open for up to ~30 s.
    pub poll_timeout: Duration,
}

impl Default for WechatEndpoints {
    fn default() -> Self {
        Self {
            app_id: "wxdfec0615563d691d".into(),
            redirect_uri: "http://user.91160.com/supplier-wechat.html".into(),
            connect_base: "https://open.weixin.qq.com".into(),
            long_poll_base: "https://lp.open.weixin.qq.com".into(),
            propagation_pages: vec![
                "https://www.91160.com/".into(),
                "https://user.91160.com/user/index.html".into(),
            ],
            cookie_hosts: vec!["www.91160.com".into(), "user.91160.com".into()],
            request_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(35),
        }
    }
}

impl WechatEndpoints {
    fn qr_connect_url(&self, state: &str) -> String {
        format!(
            "{}/connect/qrconnect?appid={}&redirect_uri={}&response_type=code&scope=snsapi_login&state={}#wechat_redirect",
            self.connect_base,
            self.app_id,
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
        )
    }

    fn qr_image_url(&self, token: &str) -> String {
        format!("{}/connect/qrcode/{}", self.connect_base, token)
    }

    fn poll_url(&self, token: &str, last: &str, now_ms: i64) -> String {
        format!(
            "{}/connect/l/qrconnect?uuid={}&last={}&_={}",
            self.long_poll_base, token, last, now_ms
        )
    }

    fn callback_url(&self, code: &str, state: Option<&str>) -> String {
        match state {
            Some(state) => format!(
                "{}?code={}&state={}",
                self.redirect_uri,
                urlencoding::encode(code),
                urlencoding::encode(state)
            ),
            None => format!("{}?code={}", self.redirect_uri, urlencoding::encode(code)),
        }
    }
}

pub struct WechatQrProvider {
    endpoints: WechatEndpoints,
    jar: Arc<Jar>,
    client: Client,
}

impl WechatQrProvider {
    pub fn new(endpoints: WechatEndpoints) -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = build_client(&endpoints, Arc::clone(&jar))?;
        Ok(Self {
            endpoints,
            jar,
            client,
        })
    }

    fn connect_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if let Ok(origin) = HeaderValue::from_str(&self.endpoints.connect_base) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.endpoints.connect_base)) {
            headers.insert(REFERER, referer);
        }
        headers
    }
}

fn build_client(endpoints: &WechatEndpoints, jar: Arc<Jar>) -> Result<Client, AuthError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .cookie_provider(jar)
        .timeout(endpoints.request_timeout)
        .build()?)
}

/// Read back every cookie the jar holds for `hosts`.
fn collect_cookies(jar: &Jar, hosts: &[String]) -> CredentialSet {
    let mut credentials = CredentialSet::new();
    for host in hosts {
        let Ok(url) = Url::parse(&format!("https://{host}/")) else {
            continue;
        };
        let Some(header) = jar.cookies(&url) else {
            continue;
        };
        if let Ok(header) = header.to_str() {
            let domain = format!(".{}", registrable_domain(host));
            credentials.merge(CredentialSet::from_cookie_header(header, &domain));
        }
    }
    credentials
}

/// `user.91160.com` -> `91160.com`
fn registrable_domain(host: &str) -> &str {
    let mut dots = host.rmatch_indices('.');
    match (dots.next(), dots.next()) {
        (Some(_), Some((idx, _))) => &host[idx + 1..],
        _ => host,
    }
}

#[async_trait]
impl IdentityProvider for WechatQrProvider {
    async fn issue_qr(&self) -> Result<QrTicket, AuthError> {
        let state = format!("login_{}", Utc::now().timestamp());

        let page = self
            .client
            .get(self.endpoints.qr_connect_url(&state))
            .headers(self.connect_headers())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let session_token = extract_session_token(&page)?;
        debug!(%session_token, "QR session token");

        let image = self
            .client
            .get(self.endpoints.qr_image_url(&session_token))
            .headers(self.connect_headers())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec();
        validate_qr_image(&image)?;

        let hosts = Url::parse(&self.endpoints.connect_base)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .into_iter()
            .collect::<Vec<_>>();
        Ok(QrTicket {
            image,
            session_token,
            state,
            credentials: collect_cookies(&self.jar, &hosts),
        })
    }

    async fn poll_once(&self, session_token: &str, last: &str) -> Result<String, AuthError> {
        let url = self
            .endpoints
            .poll_url(session_token, last, Utc::now().timestamp_millis());
        let body = self
            .client
            .get(url)
            .headers(self.connect_headers())
            .timeout(self.endpoints.poll_timeout)
            .send()
            .await?
            .text()
            .await?;
        Ok(body)
    }

    async fn exchange_code(&self, code: &str, state: Option<&str>) -> Result<CredentialSet, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = build_client(&self.endpoints, Arc::clone(&jar))?;

        let callback = self.endpoints.callback_url(code, state);
        let response = client
            .get(&callback)
            .header(REFERER, format!("{}/", self.endpoints.connect_base))
            .send()
            .await?;
        debug!(status = %response.status(), url = %response.url(), "login callback");

        for page in &self.endpoints.propagation_pages {
            // 途中のページが落ちていても、集まった cookie で判定する
            if let Err(err) = client.get(page).send().await {
                debug!(page = %page, error = %err, "propagation page failed");
            }
        }

        Ok(collect_cookies(&jar, &self.endpoints.cookie_hosts))
    }
}
