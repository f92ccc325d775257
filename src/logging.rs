use std::time::Instant;

use crate::error::{EngineError, ErrorKind};

/// Initialize structured logging with tracing.
/// Call once at startup; a second call logs a warning and leaves the first subscriber in place.
pub fn init_logging() {
    if let Err(e) = try_init_logging() {
        tracing::warn!(error = %e, "Structured logging already initialized");
    }
}

/// Like [`init_logging`] but reports an already-installed global subscriber as an error.
pub fn try_init_logging() -> Result<(), EngineError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json(),
    );

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        EngineError::new(
            ErrorKind::Config,
            format!("Failed to set global tracing subscriber: {}", e),
            "logging",
        )
    })?;

    tracing::info!("Structured logging initialized");
    Ok(())
}

pub fn log_model_call(model: &str, stage: &str, success: bool, latency_ms: u64) {
    if success {
        tracing::info!(model, stage, success, latency_ms, "Model call");
    } else {
        tracing::warn!(model, stage, success, latency_ms, "Model call");
    }
}

pub fn log_fallback(stage: &str, user_id: &str, reason: &str) {
    tracing::warn!(stage, user_id, reason, "Falling back to rule-based generation");
}

/// Timer that emits a `duration_ms` debug event when dropped
pub struct PerfTimer {
    label: &'static str,
    start: Instant,
}

impl PerfTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        tracing::debug!(label = self.label, duration_ms = self.elapsed_ms(), "Perf");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let _ = try_init_logging();
        assert!(try_init_logging().is_err());
        // the lenient variant only warns
        init_logging();
    }

    #[test]
    fn test_perf_timer_measures_elapsed() {
        let timer = PerfTimer::new("test");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5);
    }
}
