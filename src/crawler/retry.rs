//! Retry with exponential backoff for transient failures

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `op` up to `attempts` times, sleeping between tries.
///
/// Only errors that [`crate::SyncError::is_transient`] considers retryable are
/// retried; everything else is returned immediately. The delay doubles after
/// every failed attempt, starting at `base_delay`.
pub async fn with_retries<T, F, Fut>(attempts: u32, base_delay: Duration, mut op: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("Attempt {attempt}/{attempts} failed: {e}, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PurePath;
    use crate::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> SyncError {
        SyncError::Transient {
            path: PurePath::parse("x"),
            message: "flaky".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: crate::Result<()> = with_retries(3, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: crate::Result<()> = with_retries(5, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::AuthExpired) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::AuthExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
