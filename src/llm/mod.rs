pub mod gateway;
pub mod json;
pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

use crate::error::{EngineError, ErrorKind};

pub use gateway::{GenerationRequest, ModelGateway};
pub use ollama::OllamaService;

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, EngineError>> + Send>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider to constrain output to JSON
    pub json_mode: bool,
}

/// Opaque text-generation capability
#[async_trait]
pub trait LanguageModelService: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, EngineError>;

    /// Token stream; providers without streaming yield the full completion once
    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TokenStream, EngineError> {
        let text = self.complete(prompt, options).await?;
        Ok(Box::pin(tokio_stream::once(Ok(text))))
    }
}

/// Why an AI-backed generation did not produce a usable value.
/// Always recovered by the rule-based fallback.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("model call failed: {0}")]
    Model(EngineError),
    #[error("circuit open, model skipped")]
    CircuitOpen,
    #[error("no JSON found in model output: {0}")]
    Extract(String),
    #[error("model output failed validation: {0}")]
    Schema(String),
    #[error("generation cancelled")]
    Cancelled,
}

impl From<EngineError> for GenerationError {
    fn from(err: EngineError) -> Self {
        GenerationError::Model(err)
    }
}

impl From<GenerationError> for EngineError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Model(inner) => inner,
            other => EngineError::new(ErrorKind::Generation, other.to_string(), "generation"),
        }
    }
}

/// Typed model output that must be checked before it is trusted
pub trait Validate {
    fn validate(&self) -> Result<(), GenerationError>;
}
