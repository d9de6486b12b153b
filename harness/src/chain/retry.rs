use std::future::Future;

use tracing::info;

use super::FetchError;

/// Retry rate-limited lookups after a fixed backoff.
///
/// Nothing but [`FetchError::RateLimited`] is retried: a timeout or any other
/// failure is returned as is.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    backoff: tokio::time::Duration,
    /// [`None`] retries until the provider relents.
    max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(tokio::time::Duration::from_secs(1), None)
    }
}

impl RetryPolicy {
    pub const fn new(backoff: tokio::time::Duration, max_retries: Option<u32>) -> Self {
        Self {
            backoff,
            max_retries,
        }
    }

    pub fn backoff(&self) -> tokio::time::Sleep {
        tokio::time::sleep(self.backoff)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retries = 0;
        loop {
            match call().await {
                Err(FetchError::RateLimited)
                    if self.max_retries.map_or(true, |max| retries < max) =>
                {
                    retries += 1;
                    info!("{what} was rate limited, retransmitting (retry {retries})");
                    self.backoff().await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn immediate(max_retries: Option<u32>) -> RetryPolicy {
        RetryPolicy::new(tokio::time::Duration::ZERO, max_retries)
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let calls = &AtomicU32::new(0);
        let result = immediate(None)
            .run("lookup", move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=2 => Err(FetchError::RateLimited),
                    n => Ok(n),
                }
            })
            .await;
        assert!(matches!(result, Ok(3)));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = immediate(Some(2))
            .run("lookup", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::RateLimited)
            })
            .await;
        assert!(matches!(result, Err(FetchError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_timeouts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = immediate(None)
            .run("lookup", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Timeout)
            })
            .await;
        assert!(matches!(result, Err(FetchError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
