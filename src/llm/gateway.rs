use std::sync::Arc;
use std::time::Instant;

use crate::cache::ResponseCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::llm::{CompletionOptions, GenerationError, LanguageModelService};
use crate::metrics::EngineMetrics;
use crate::retry::RetryPolicy;

/// One AI generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub stage: &'static str,
    pub prompt: String,
    /// Skip the cache when `None`
    pub cache_key: Option<String>,
    pub options: CompletionOptions,
}

/// Cache, circuit breaker and retry in front of a [`LanguageModelService`].
///
/// Shared by every learner; only output that parsed and validated is cached.
pub struct ModelGateway {
    service: Arc<dyn LanguageModelService>,
    cache: Arc<ResponseCache>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    metrics: EngineMetrics,
}

impl ModelGateway {
    pub fn new(
        service: Arc<dyn LanguageModelService>,
        cache: Arc<ResponseCache>,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
        metrics: EngineMetrics,
    ) -> Self {
        ModelGateway {
            service,
            cache,
            retry,
            breaker,
            metrics,
        }
    }

    pub fn from_config(
        service: Arc<dyn LanguageModelService>,
        config: &EngineConfig,
        metrics: EngineMetrics,
    ) -> Self {
        Self::new(
            service,
            Arc::new(ResponseCache::from_config(&config.cache)),
            RetryPolicy::from(&config.retry),
            CircuitBreaker::from_config(&config.circuit_breaker),
            metrics,
        )
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn model_name(&self) -> &str {
        self.service.name()
    }

    /// Run `request` through cache, breaker and retried model call, then `parse` the text
    pub async fn generate<T, P>(&self, request: GenerationRequest, parse: P) -> Result<T, GenerationError>
    where
        P: Fn(&str) -> Result<T, GenerationError>,
    {
        let stage = request.stage;

        if let Some(key) = request.cache_key.as_deref() {
            match self.cache.get(key).map(|text| parse(&text)) {
                Some(Ok(value)) => {
                    self.metrics.record_cache_hit();
                    return Ok(value);
                }
                Some(Err(e)) => {
                    tracing::warn!(stage, error = %e, "Discarding unusable cached response");
                    self.metrics.record_cache_miss();
                }
                None => self.metrics.record_cache_miss(),
            }
        }

        if self.breaker.is_open() {
            tracing::debug!(stage, model = self.service.name(), "Circuit open, skipping model");
            return Err(GenerationError::CircuitOpen);
        }

        let started = Instant::now();
        let prompt = request.prompt.as_str();
        let options = &request.options;
        let attempt_timeout = self.retry.attempt_timeout;
        let model = self.service.name().to_string();

        let outcome = self
            .retry
            .retry_with_backoff(
                |_attempt| {
                    let service = Arc::clone(&self.service);
                    self.metrics.record_model_call();
                    async move {
                        match attempt_timeout {
                            Some(limit) => {
                                tokio::time::timeout(limit, service.complete(prompt, options))
                                    .await
                                    .map_err(EngineError::from)?
                            }
                            None => service.complete(prompt, options).await,
                        }
                    }
                },
                |failure| {
                    self.metrics.record_retry();
                    tracing::warn!(
                        stage,
                        model = %model,
                        attempt = failure.attempt,
                        max_attempts = failure.max_attempts,
                        delay_ms = failure.delay.as_millis() as u64,
                        error = %failure.error,
                        "Model call failed, retrying with backoff"
                    );
                },
            )
            .await;

        let text = match outcome {
            Ok(text) => {
                self.breaker.record_success();
                text
            }
            Err(e) => {
                self.metrics.record_model_failure();
                self.breaker.record_failure();
                tracing::error!(
                    stage,
                    model = %model,
                    attempts = self.retry.attempts(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Model call failed after all retries"
                );
                return Err(GenerationError::Model(
                    e.with_model(model).with_attempts(self.retry.attempts()),
                ));
            }
        };

        let value = parse(&text).map_err(|e| {
            tracing::warn!(stage, model = %model, error = %e, "Model output rejected");
            e
        })?;

        if let Some(key) = request.cache_key {
            self.cache.set(key, text);
        }
        tracing::info!(
            stage,
            model = %model,
            latency_ms = started.elapsed().as_millis() as u64,
            "Model generation succeeded"
        );
        Ok(value)
    }
}
