//! Bounded retry with exponential backoff for transient daemon failures.

use std::future::Future;
use std::time::Duration;

use crate::error::DaemonResult;

/// How many times to attempt an operation and how long to wait between
/// attempts.
///
/// The delay before attempt `n` (counting from zero) is
/// `initial_delay * 2^n` when `delay_first_attempt` is set, and
/// `initial_delay * 2^(n-1)` otherwise, so the first attempt runs at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay preceding the first delayed attempt.
    pub initial_delay: Duration,
    /// Whether the first attempt also waits.
    pub delay_first_attempt: bool,
}

impl RetryPolicy {
    /// Policy used to re-establish SSH tunnels: three attempts after waits of
    /// one, two, and four seconds.
    pub const TUNNEL_RECONNECT: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        delay_first_attempt: true,
    };

    /// Delay to wait before attempt number `attempt` (zero-based).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = if self.delay_first_attempt {
            Some(attempt)
        } else {
            attempt.checked_sub(1)
        };
        exponent.map_or(Duration::ZERO, |power| {
            let factor = 2_u32.saturating_pow(power);
            self.initial_delay.saturating_mul(factor)
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            delay_first_attempt: false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are exhausted.
///
/// Only errors reporting [`DaemonError::is_transient`] are retried. The
/// final error is returned unchanged.
///
/// [`DaemonError::is_transient`]: crate::error::DaemonError::is_transient
///
/// # Errors
///
/// Returns the first permanent error, or the last transient error once all
/// attempts have failed.
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> DaemonResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DaemonResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt = attempt + 1, delay = ?delay, "waiting before retry");
            tokio::time::sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt + 1 < attempts => {
                tracing::warn!(attempt = attempt + 1, error = %error, "transient failure, retrying");
            }
            Err(error) => return Err(error),
        }
        attempt += 1;
    }
}
