//! Cooperative cancellation for in-flight store calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Drive `fut` until it completes or `token` is cancelled.
///
/// Returns `None` on cancellation; the future is dropped mid-flight and any
/// partial write it made is left in place.
pub async fn until_cancelled<F>(token: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    if token.is_cancelled() {
        return None;
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = fut => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(until_cancelled(&token, async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls() {
        let token = CancellationToken::new();
        token.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = until_cancelled(&token, async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .await;

        assert!(result.is_none());
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_during_flight() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let result = until_cancelled(&token, tokio::time::sleep(Duration::from_secs(10))).await;
        assert!(result.is_none());
    }
}
