use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::BreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u64,
    opened_at: Option<Instant>,
}

/// Circuit breaker in front of the language model.
///
/// Counts consecutive failed calls (after retries). Once `failure_threshold` is
/// reached the circuit opens and calls are skipped until `cooldown` elapses,
/// at which point one probe is allowed through (half-open).
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    cooldown: Duration,
    failure_threshold: u64,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u64) -> Self {
        CircuitBreaker {
            state: Arc::new(Mutex::new(BreakerState::default())),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cooldown_secs),
            config.failure_threshold,
        )
    }

    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        match state.opened_at {
            Some(opened) if opened.elapsed() >= self.cooldown => {
                // half-open: let the next call probe the model
                state.opened_at = None;
                state.consecutive_failures = self.failure_threshold - 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened for language model"
            );
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.state.lock().consecutive_failures
    }
}
