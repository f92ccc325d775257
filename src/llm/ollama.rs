use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::ModelConfig;
use crate::error::EngineError;
use crate::llm::{CompletionOptions, LanguageModelService, TokenStream};
use crate::logging::{log_model_call, PerfTimer};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Serialize, Default)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Ollama-compatible `/api/generate` client
#[derive(Clone)]
pub struct OllamaService {
    client: Client,
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
}

impl OllamaService {
    pub fn new(config: &ModelConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| EngineError::from(e).with_context("building HTTP client"))?;

        Ok(OllamaService {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            default_temperature: config.temperature,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, options: &CompletionOptions, stream: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            format: options.json_mode.then_some("json"),
            options: GenerateOptions {
                temperature: options.temperature.or(self.default_temperature),
                num_predict: options.max_tokens,
            },
        }
    }

    async fn send(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt, options, stream))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            );
        }
        Ok(response)
    }

    async fn fetch_completion(&self, prompt: &str, options: &CompletionOptions) -> anyhow::Result<String> {
        let response = self.send(prompt, options, false).await?;
        let chunk: GenerateChunk = response
            .json()
            .await
            .context("Failed to decode Ollama response")?;
        if chunk.response.trim().is_empty() {
            anyhow::bail!("Model '{}' returned empty response", self.model);
        }
        Ok(chunk.response)
    }

    fn model_error(&self, err: anyhow::Error) -> EngineError {
        EngineError::from(err)
            .with_stage("model_call")
            .with_model(self.model.clone())
    }
}

/// Splits a byte stream into complete lines. Bytes are held until their line
/// ends, so multi-byte characters split across chunks decode intact.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream ends without a final newline
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Forward one NDJSON line. Returns false once the stream is finished or the
/// receiver is gone.
async fn forward_line(line: &str, model: &str, tx: &mpsc::Sender<Result<String, EngineError>>) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(parsed) => {
            if !parsed.response.is_empty() && tx.send(Ok(parsed.response)).await.is_err() {
                return false;
            }
            !parsed.done
        }
        Err(e) => {
            tracing::warn!(model, error = %e, "Skipping malformed stream line");
            true
        }
    }
}

#[async_trait]
impl LanguageModelService for OllamaService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, EngineError> {
        let perf = PerfTimer::new("ollama_complete");
        let result = self
            .fetch_completion(prompt, options)
            .await
            .map_err(|e| self.model_error(e));

        log_model_call(&self.model, "complete", result.is_ok(), perf.elapsed_ms());
        result
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TokenStream, EngineError> {
        let response = self
            .send(prompt, options, true)
            .await
            .map_err(|e| self.model_error(e))?;
        let mut bytes = Box::pin(response.bytes_stream());
        let model = self.model.clone();
        let (tx, rx) = mpsc::channel::<Result<String, EngineError>>(32);

        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(EngineError::from(e).with_model(model.clone()))).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    if !forward_line(&line, &model, &tx).await {
                        return;
                    }
                }
            }
            if let Some(rest) = lines.finish() {
                forward_line(&rest, &model, &tx).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
