//! Retry with exponential backoff for dump downloads.
//!
//! Dump servers throttle aggressively and multi-gigabyte transfers get reset;
//! both are worth another attempt, a 404 or a rejected user agent is not.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Backoff policy for dump downloads.
///
/// Waits double from `initial_delay` up to `max_delay`. A throttled request
/// (HTTP 429) waits at least `rate_limit_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of the doubling wait.
    pub max_delay: Duration,
    /// Minimum wait after the server throttled the download.
    pub rate_limit_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            rate_limit_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Default backoff with `max_retries` retries.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based) after `cause`.
    #[must_use]
    pub fn delay_for(&self, retry: u32, cause: &Error) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let doublings = (retry - 1).min(16);
        let delay = self
            .initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);

        if matches!(cause, Error::RateLimit(_)) {
            delay.max(self.rate_limit_delay)
        } else {
            delay
        }
    }
}

/// Determines if an error is worth another attempt.
#[must_use]
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::RateLimit(_) | Error::Io(_) => true,
        Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
        Error::Download(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("504")
                || msg.contains("timeout")
                || msg.contains("connection reset")
                || msg.contains("truncated")
        }
        _ => false,
    }
}

/// Executes an async operation with retry logic.
///
/// Returns the result of the operation, or the last error once retries are
/// exhausted or a non-retryable error occurs.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{}: succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt < config.max_retries && is_retryable_error(&e) => {
                attempt += 1;
                let delay = config.delay_for(attempt, &e);
                warn!(
                    "{}: {} (retry {}/{} in {:?})",
                    operation_name, e, attempt, config.max_retries, delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
