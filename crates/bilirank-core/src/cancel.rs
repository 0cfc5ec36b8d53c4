use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Races `fut` against `token`.
///
/// Returns `None` if the token fired first; the future is dropped.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        out = fut => Some(out),
    }
}
