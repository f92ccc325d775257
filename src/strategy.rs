use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::llm::GenerationError;
use crate::logging::log_fallback;
use crate::metrics::EngineMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Model,
    RuleBased,
}

/// A generated value and the strategy that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generated<T> {
    pub value: T,
    pub source: GenerationSource,
}

/// Two-stage generation: race the AI `attempt` against `cancel`; on error or
/// cancellation run the deterministic `fallback` instead.
pub async fn attempt_then_fallback<T, A, F>(
    stage: &'static str,
    user_id: &str,
    cancel: &CancellationToken,
    metrics: &EngineMetrics,
    attempt: A,
    fallback: F,
) -> Generated<T>
where
    A: Future<Output = Result<T, GenerationError>>,
    F: FnOnce() -> T,
{
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        result = attempt => result,
    };

    match outcome {
        Ok(value) => Generated {
            value,
            source: GenerationSource::Model,
        },
        Err(e) => {
            metrics.record_fallback();
            log_fallback(stage, user_id, &e.to_string());
            Generated {
                value: fallback(),
                source: GenerationSource::RuleBased,
            }
        }
    }
}
