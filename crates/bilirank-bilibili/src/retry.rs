//! Retry with exponential back-off and jitter for platform reads.
//!
//! Network failures, 5xx responses, throttling (412/429) and most non-zero
//! envelope codes are treated as transient. Input errors, malformed bodies and
//! WBI key failures are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::BilibiliError;

/// Envelope codes that will not change on retry: bad request, not logged in,
/// access denied, not found.
const PERMANENT_API_CODES: [i64; 4] = [-400, -101, -403, -404];

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
pub(crate) fn is_retriable(err: &BilibiliError) -> bool {
    match err {
        BilibiliError::Http(e) => !e.is_builder() && !e.is_decode(),
        BilibiliError::Throttled { .. } => true,
        BilibiliError::UnexpectedStatus { status, .. } => *status >= 500,
        BilibiliError::Api { code, .. } => !PERMANENT_API_CODES.contains(code),
        BilibiliError::Deserialize { .. }
        | BilibiliError::MissingData { .. }
        | BilibiliError::InvalidBvid(_)
        | BilibiliError::InvalidInput(_)
        | BilibiliError::InvalidUrl { .. }
        | BilibiliError::WbiKeys(_)
        | BilibiliError::Cancelled => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors.
///
/// The wait before retry `n` is `backoff_base_ms * 2^(n-1)` with ±25% jitter,
/// capped at 30 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, BilibiliError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BilibiliError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient platform error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn throttled() -> BilibiliError {
        BilibiliError::Throttled {
            status: 412,
            url: "https://api.bilibili.com/x/v2/reply".to_owned(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, BilibiliError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_throttling_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(throttled())
                } else {
                    Ok::<u32, BilibiliError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(2, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, BilibiliError>(BilibiliError::Api {
                    code: -352,
                    message: "风控校验失败".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(BilibiliError::Api { code: -352, .. })));
    }

    #[tokio::test]
    async fn does_not_retry_permanent_api_code() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, BilibiliError>(BilibiliError::Api {
                    code: -404,
                    message: "啥都木有".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(BilibiliError::Api { code: -404, .. })));
    }

    #[tokio::test]
    async fn does_not_retry_deserialize_error() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                let e = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
                Err::<u32, BilibiliError>(BilibiliError::Deserialize {
                    context: "test".to_owned(),
                    source: e,
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(BilibiliError::Deserialize { .. })));
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!is_retriable(&BilibiliError::UnexpectedStatus {
            status: 404,
            url: "u".into()
        }));
        assert!(is_retriable(&BilibiliError::UnexpectedStatus {
            status: 502,
            url: "u".into()
        }));
        assert!(!is_retriable(&BilibiliError::WbiKeys("nav down".into())));
    }
}
