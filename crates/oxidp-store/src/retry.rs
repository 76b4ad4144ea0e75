//! Bounded retry for transient store errors and id collisions.

use std::future::Future;
use std::time::Duration;

/// Runs `f` up to `attempts` times, sleeping `(1 + 2·attempt)` ms between
/// tries, and returns the first success or the last error.
///
/// # Errors
///
/// Returns the error of the final attempt when all attempts fail.
pub async fn retry_if_error<T, E, F, Fut>(attempts: u32, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(1 + attempt * 2))).await;
        }
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.expect("at least one attempt ran"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_if_error(5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), u32> = retry_if_error(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(n) }
        })
        .await;
        assert_eq!(result.unwrap_err(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let result: Result<u32, &str> = retry_if_error(0, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
