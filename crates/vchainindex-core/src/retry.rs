//! Bounded retry for indexing attempts.
//!
//! No backoff at this layer; spacing out calls is the transport's job.

use std::future::Future;

use crate::error::IndexerError;

/// Run `attempt` up to `retries + 1` times, returning the first success or
/// the last error. Non-retryable errors are returned immediately.
pub async fn with_retries<T, F, Fut>(
    retries: u32,
    operation: &str,
    mut attempt: F,
) -> Result<T, IndexerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IndexerError>>,
{
    let mut tries = 0u32;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && tries <= retries => {
                tracing::warn!(
                    operation,
                    attempt = tries,
                    retries,
                    error = %e,
                    "attempt failed, retrying"
                );
            }
            Err(e) => {
                tracing::error!(operation, attempt = tries, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retries(0, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IndexerError::Fetch("down".into()))
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_within_budget() {
        let calls = AtomicU32::new(0);
        let res = with_retries(2, "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(IndexerError::Fetch("flaky".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retries(1, "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(IndexerError::Fetch(format!("failure {n}")))
        })
        .await;
        assert_eq!(res.unwrap_err().to_string(), "Fetch error: failure 1");
    }

    #[tokio::test]
    async fn config_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retries(5, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IndexerError::Config("bad".into()))
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
