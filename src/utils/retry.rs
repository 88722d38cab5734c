//! Retry with a fixed backoff for rate-limited API calls.

use std::time::Duration;
use tokio::time::sleep;

use crate::client::FetchError;

/// Default pause after an HTTP 429 (five minutes)
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(300);

/// Default number of retries after the first rate-limited attempt
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Configuration for rate-limit retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt (at least one is always made)
    pub max_retries: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Set the maximum number of retries (clamped to at least one)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff between retries
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn effective_max_retries(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result; `Err(FetchError::RateLimited)` when retries ran out
    pub result: Result<T, FetchError>,
    /// Total attempts made
    pub attempts: u32,
    /// Attempts answered with a rate limit
    pub rate_limited: u32,
}

/// Execute an async operation, retrying only when it reports a rate limit.
///
/// Every other error, and success, is returned immediately. The backoff
/// suspends the calling task; nothing else in the session makes progress.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let mut operation = operation;
    let mut attempts = 0;
    let mut rate_limited = 0;
    let max_attempts = config.effective_max_retries() + 1;

    loop {
        attempts += 1;

        match operation().await {
            Err(error) if error.is_rate_limited() => {
                rate_limited += 1;

                if attempts >= max_attempts {
                    tracing::warn!(
                        "Still rate limited after {} attempts, giving up",
                        attempts
                    );
                    return RetryOutcome {
                        result: Err(error),
                        attempts,
                        rate_limited,
                    };
                }

                tracing::warn!(
                    "Too many requests (attempt {}/{}), waiting {:?} before retrying",
                    attempts,
                    max_attempts,
                    config.backoff
                );
                sleep(config.backoff).await;
                tracing::info!("Retrying after rate limit");
            }
            result => {
                if attempts > 1 {
                    tracing::info!(
                        "Request went through on attempt {} after {} rate-limited attempts",
                        attempts,
                        rate_limited
                    );
                }
                return RetryOutcome {
                    result,
                    attempts,
                    rate_limited,
                };
            }
        }
    }
}
