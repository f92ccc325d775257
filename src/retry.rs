use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

/// Bounded exponential-backoff retry.
///
/// Delay before retry `n` (1-based failed attempt) is
/// `min(initial_delay * backoff_multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Applied per attempt by callers that wrap I/O; not enforced by `retry_with_backoff` itself
    pub attempt_timeout: Option<Duration>,
}

/// Passed to the failure hook before each retry
#[derive(Debug)]
pub struct AttemptFailure<'a, E> {
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a E,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            attempt_timeout: (config.attempt_timeout_ms > 0)
                .then(|| Duration::from_millis(config.attempt_timeout_ms)),
        }
    }
}

impl RetryPolicy {
    /// Never fewer than one attempt
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;
        if !delay_ms.is_finite() || delay_ms >= max_ms {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms.max(0.0) as u64)
        }
    }

    /// Worst-case wall clock spent in the whole retry loop
    pub fn worst_case_duration(&self) -> Duration {
        let per_attempt = self.attempt_timeout.unwrap_or(Duration::ZERO) + self.max_delay;
        per_attempt * self.attempts()
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// `operation` receives the 1-based attempt number. After a failure with
    /// attempts remaining, the policy sleeps, calls `on_attempt_failure`, then
    /// retries. The last error is returned unchanged.
    pub async fn retry_with_backoff<T, E, F, Fut, C>(
        &self,
        mut operation: F,
        mut on_attempt_failure: C,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnMut(AttemptFailure<'_, E>),
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt >= max_attempts => return Err(error),
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                    on_attempt_failure(AttemptFailure {
                        attempt,
                        max_attempts,
                        delay,
                        error: &error,
                    });
                    attempt += 1;
                }
            }
        }
    }
}
