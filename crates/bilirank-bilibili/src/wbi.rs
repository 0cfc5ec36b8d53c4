//! WBI request signing.
//!
//! Signed endpoints require `wts` (unix seconds) and `w_rid`, the MD5 of the
//! sorted, form-encoded query followed by the mixin key. The mixin key is
//! derived from two sub-keys published by the `nav` endpoint and rotates
//! daily, so it is cached for a bounded window.

use std::future::Future;
use std::time::{Duration, Instant};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::sync::Mutex;

use crate::error::BilibiliError;

const MIXIN_KEY_ENC_TAB: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25,
    54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

const MIXIN_KEY_LEN: usize = 32;

/// Characters the platform strips from values before signing.
const STRIPPED_CHARS: [char; 5] = ['!', '\'', '(', ')', '*'];

/// Form encoding: everything except `A-Za-z0-9-_.~` is percent-encoded.
/// Spaces are turned into `+` afterwards.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Default lifetime of a cached mixin key.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(60 * 60);

/// Derives the 32-character mixin key from the two sub-keys.
#[must_use]
pub fn mixin_key(img_key: &str, sub_key: &str) -> String {
    let raw: Vec<char> = img_key.chars().chain(sub_key.chars()).collect();
    MIXIN_KEY_ENC_TAB
        .iter()
        .filter_map(|&i| raw.get(i))
        .take(MIXIN_KEY_LEN)
        .collect()
}

/// Extracts the key from a sub-key URL: the file stem of the last path
/// segment, e.g. `https://i0.hdslb.com/bfs/wbi/7cd0…077c.png` → `7cd0…077c`.
#[must_use]
pub fn key_from_url(url: &str) -> String {
    let file = url.rsplit('/').next().unwrap_or(url);
    match file.rsplit_once('.') {
        Some((stem, _ext)) => stem.to_string(),
        None => file.to_string(),
    }
}

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// Encodes `params` as a form query string, preserving their order.
#[must_use]
pub fn encode_query<K: AsRef<str>>(params: &[(K, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k.as_ref()), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns the sanitised parameters sorted by key, with `wts` added and
/// `w_rid` appended last, ready for [`encode_query`].
#[must_use]
pub fn sign_params(params: &[(&str, String)], mixin_key: &str, wts: u64) -> Vec<(String, String)> {
    let mut signed: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| *k != "wts" && *k != "w_rid")
        .map(|(k, v)| {
            let clean: String = v.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
            ((*k).to_string(), clean)
        })
        .collect();
    signed.push(("wts".to_string(), wts.to_string()));
    signed.sort_by(|a, b| a.0.cmp(&b.0));

    let query = encode_query(&signed);
    let digest = md5::compute(format!("{query}{mixin_key}"));
    signed.push(("w_rid".to_string(), format!("{digest:x}")));
    signed
}

#[derive(Debug, Clone)]
struct CachedKey {
    mixin_key: String,
    fetched_at: Instant,
}

/// Process-scoped cache of the current mixin key.
///
/// Created with the client, refreshed lazily once the entry is older than its
/// TTL, and flushed with [`WbiKeyCache::invalidate`].
#[derive(Debug)]
pub struct WbiKeyCache {
    ttl: Duration,
    entry: Mutex<Option<CachedKey>>,
}

impl Default for WbiKeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_TTL)
    }
}

impl WbiKeyCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Returns the cached mixin key, calling `fetch` for fresh
    /// `(img_key, sub_key)` when the cache is empty or expired.
    ///
    /// The lock is held across the fetch so concurrent callers trigger a
    /// single refresh.
    ///
    /// # Errors
    ///
    /// Propagates the error from `fetch` unchanged; nothing is cached.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, BilibiliError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, String), BilibiliError>>,
    {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.mixin_key.clone());
            }
        }

        let (img_key, sub_key) = fetch().await?;
        let key = mixin_key(&img_key, &sub_key);
        if key.chars().count() < MIXIN_KEY_LEN {
            return Err(BilibiliError::WbiKeys(format!(
                "sub-keys too short to derive a mixin key ({} + {} chars)",
                img_key.len(),
                sub_key.len()
            )));
        }
        tracing::debug!("refreshed WBI mixin key");
        *entry = Some(CachedKey {
            mixin_key: key.clone(),
            fetched_at: Instant::now(),
        });
        Ok(key)
    }

    /// Drops the cached key so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}
