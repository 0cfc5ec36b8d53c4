//! Retrying HTTP client for the platform's JSON API.

mod comments;
mod search;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bilirank_core::AppConfig;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::BilibiliError;
use crate::retry::retry_with_backoff;
use crate::types::{ApiEnvelope, NavData};
use crate::wbi::{encode_query, key_from_url, sign_params, WbiKeyCache};

pub use comments::{CommentPage, COMMENT_PAGE_SIZE, DEFAULT_MAX_REPLIES};
pub use search::{strip_highlight, SearchPage, DEFAULT_SEARCH_PAGE_SIZE, MAX_SEARCH_PAGE_SIZE};

pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";

pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const SITE_REFERER: &str = "https://www.bilibili.com/";

/// Envelope code for "not logged in"; the nav endpoint still returns the
/// WBI sub-keys alongside it.
const NOT_LOGGED_IN: i64 = -101;

/// Connection and retry settings for [`BilibiliClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub cookie: Option<String>,
    /// Additional attempts after the first failure for transient errors.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Pause between nested-reply pages.
    pub reply_page_delay_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: BROWSER_USER_AGENT.to_string(),
            cookie: None,
            max_retries: 2,
            backoff_base_ms: 500,
            reply_page_delay_ms: 100,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.http_timeout_secs,
            user_agent: config.user_agent.clone(),
            cookie: config.bilibili_cookie.clone(),
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_retry_backoff_ms,
            ..Self::default()
        }
    }
}

/// Client for search, comment and reply listing.
///
/// Every request carries a browser `User-Agent`, the site `Referer` and the
/// optional session cookie. Signed endpoints pull the mixin key from a
/// per-client [`WbiKeyCache`].
pub struct BilibiliClient {
    http: Client,
    base_url: String,
    options: ClientOptions,
    keys: WbiKeyCache,
}

impl BilibiliClient {
    /// Creates a client against the production API.
    ///
    /// # Errors
    ///
    /// Returns [`BilibiliError::InvalidInput`] if the cookie is not a valid
    /// header value, or [`BilibiliError::Http`] if the `reqwest::Client`
    /// cannot be constructed.
    pub fn new(options: ClientOptions) -> Result<Self, BilibiliError> {
        Self::with_base_url(options, DEFAULT_API_BASE)
    }

    /// Creates a client against `base_url`; used by tests to target a mock
    /// server.
    ///
    /// # Errors
    ///
    /// See [`BilibiliClient::new`].
    pub fn with_base_url(
        options: ClientOptions,
        base_url: impl Into<String>,
    ) -> Result<Self, BilibiliError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(SITE_REFERER));
        if let Some(cookie) = options.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
            let value = HeaderValue::from_str(cookie.trim())
                .map_err(|e| BilibiliError::InvalidInput(format!("cookie header: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            options,
            keys: WbiKeyCache::default(),
        })
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Drops the cached mixin key so the next signed call refreshes it.
    pub async fn invalidate_wbi_keys(&self) {
        self.keys.invalidate().await;
    }

    fn endpoint(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        }
    }

    /// One GET, no retry. Maps throttling and other non-2xx statuses to typed
    /// errors and decodes the envelope.
    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<ApiEnvelope<T>, BilibiliError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::PRECONDITION_FAILED
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(BilibiliError::Throttled {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(BilibiliError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| BilibiliError::Deserialize {
            context: context.to_string(),
            source,
        })
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>, context: &str) -> Result<T, BilibiliError> {
        if envelope.code != 0 {
            return Err(BilibiliError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }
        envelope.data.ok_or_else(|| BilibiliError::MissingData {
            context: context.to_string(),
        })
    }

    /// Unsigned GET with retry on transient failures.
    pub(crate) async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        context: &str,
    ) -> Result<T, BilibiliError> {
        let url = self.endpoint(path, &encode_query(params));
        retry_with_backoff(self.options.max_retries, self.options.backoff_base_ms, || {
            let url = url.clone();
            async move {
                let envelope = self.send_json::<T>(&url, context).await?;
                Self::unwrap_envelope(envelope, context)
            }
        })
        .await
    }

    /// WBI-signed GET with retry on transient failures.
    ///
    /// The mixin key is resolved once, before the retry loop; each attempt
    /// re-signs with a fresh `wts`.
    pub(crate) async fn get_signed_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        context: &str,
    ) -> Result<T, BilibiliError> {
        let mixin = self.mixin_key().await?;
        retry_with_backoff(self.options.max_retries, self.options.backoff_base_ms, || {
            let signed = sign_params(params, &mixin, unix_now());
            let url = self.endpoint(path, &encode_query(&signed));
            async move {
                let envelope = self.send_json::<T>(&url, context).await?;
                Self::unwrap_envelope(envelope, context)
            }
        })
        .await
    }

    async fn mixin_key(&self) -> Result<String, BilibiliError> {
        self.keys.get_or_refresh(|| self.fetch_wbi_keys()).await
    }

    /// Reads the current `(img_key, sub_key)` from the nav endpoint.
    ///
    /// Single attempt; every failure surfaces as [`BilibiliError::WbiKeys`].
    async fn fetch_wbi_keys(&self) -> Result<(String, String), BilibiliError> {
        let url = self.endpoint("/x/web-interface/nav", "");
        let envelope = self
            .send_json::<NavData>(&url, "nav")
            .await
            .map_err(|e| BilibiliError::WbiKeys(e.to_string()))?;

        if envelope.code != 0 && envelope.code != NOT_LOGGED_IN {
            return Err(BilibiliError::WbiKeys(format!(
                "nav returned code {}: {}",
                envelope.code, envelope.message
            )));
        }

        let img = envelope
            .data
            .and_then(|d| d.wbi_img)
            .ok_or_else(|| BilibiliError::WbiKeys("nav response has no wbi_img".to_string()))?;
        let img_key = key_from_url(&img.img_url);
        let sub_key = key_from_url(&img.sub_url);
        if img_key.is_empty() || sub_key.is_empty() {
            return Err(BilibiliError::WbiKeys(
                "nav response has empty sub-key URLs".to_string(),
            ));
        }
        Ok((img_key, sub_key))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
