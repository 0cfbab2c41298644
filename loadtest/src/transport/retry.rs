//! Retry decorator for HTTP transports.

use async_trait::async_trait;
use reqwest::{Request, Response};
use std::time::Duration;
use tracing::{debug, warn};

use super::HttpTransport;
use crate::config::HttpConfig;

/// Backoff settings for [`RetryTransport`].
///
/// Delay before retry `n` (0-based) is `base_delay * 2^n`, without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base of the exponential backoff.
    pub base_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    /// Creates a policy from HTTP settings.
    #[must_use]
    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(config.base_delay(), config.max_retries)
    }

    /// Delay slept after the given failed attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Retries requests that come back with a 5xx status.
///
/// Transport-level failures (connection refused, timeouts) are returned
/// immediately. A request whose body cannot be cloned gets a single attempt.
#[derive(Debug, Clone)]
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: HttpTransport> RetryTransport<T> {
    /// Wraps a transport.
    #[must_use]
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wraps a transport with the default policy.
    #[must_use]
    pub fn with_default_policy(inner: T) -> Self {
        Self::new(inner, RetryPolicy::default())
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the wrapped transport.
    #[must_use]
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RetryTransport<T> {
    async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        let mut request = request;
        let mut attempt: u32 = 0;

        loop {
            let replay = request.try_clone();
            let url = request.url().clone();
            let response = self.inner.execute(request).await?;

            let status = response.status();
            if status.as_u16() < 500 || attempt >= self.policy.max_retries {
                return Ok(response);
            }

            let Some(next) = replay else {
                debug!(url = %url, status = %status, "Request body cannot be replayed, not retrying");
                return Ok(response);
            };

            // Drain so the connection can go back to the pool.
            if let Err(e) = response.bytes().await {
                debug!(url = %url, status = %status, error = %e, "Failed to drain response body");
            }

            let delay = self.policy.delay_for_attempt(attempt);
            warn!(
                url = %url,
                status = %status,
                attempt = attempt + 1,
                max_retries = self.policy.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Server error, retrying request"
            );
            tokio::time::sleep(delay).await;

            attempt += 1;
            request = next;
        }
    }
}
