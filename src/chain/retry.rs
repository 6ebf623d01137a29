//! Bounded retry with exponential backoff for transient RPC failures

use crate::config::RetryConfig;
use crate::error::VanityResult;

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries an operation while it fails with a retryable error
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `op`, retrying retryable errors up to `max_retries` times
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> VanityResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VanityResult<T>>,
    {
        let mut retries = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.backoff(retries);
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        operation, e, retries, self.max_retries, delay
                    );
                    crate::metrics::record_retry(operation);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VanityError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250), Duration::from_secs(1));

        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_secs(1));
        assert_eq!(policy.backoff(10), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retries_network_errors_until_success() {
        let calls = AtomicU32::new(0);

        let result = instant(3)
            .run("eth_chainId", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(VanityError::network("eth_chainId", "connection reset"))
                } else {
                    Ok(56u64)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 56);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);

        let result: VanityResult<()> = instant(2)
            .run("eth_chainId", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VanityError::network("eth_chainId", "timeout"))
            })
            .await;

        assert!(matches!(result, Err(VanityError::Network { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejections() {
        let calls = AtomicU32::new(0);

        let result: VanityResult<()> = instant(5)
            .run("eth_sendRawTransaction", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VanityError::Rejected {
                    code: -32000,
                    message: "insufficient funds for gas * price + value".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(VanityError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
