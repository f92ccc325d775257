use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes the engine distinguishes when deciding whether to recover,
/// retry or surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Profile (or other record) absent. Recovered by synthesizing a default.
    NotFound,
    /// Store or network hiccup. Retried, then surfaced or absorbed by the call site.
    TransientIo,
    /// Language-model failure or unusable output. Always recovered by a fallback.
    Generation,
    /// Response cache trouble. Always absorbed.
    Cache,
    /// An operation that needs a loaded profile ran before `initialize`.
    NotInitialized,
    /// Stored data could not be (de)serialized, or belongs to another learner.
    Serialization,
    /// A caller-supplied value conflicts with the engine's state.
    InvalidInput,
    /// Invalid or unreadable configuration.
    Config,
}

/// Unified error type for the engine.
/// Every fallible public operation returns `Result<T, EngineError>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: String,
    pub model: Option<String>,
    pub attempts: Option<u32>,
    pub context: Option<String>,
    pub source: Option<String>,
}

impl EngineError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S, stage: &'static str) -> Self {
        EngineError {
            kind,
            message: message.into(),
            stage: stage.to_string(),
            model: None,
            attempts: None,
            context: None,
            source: None,
        }
    }

    pub fn not_found<S: Into<String>>(message: S, stage: &'static str) -> Self {
        Self::new(ErrorKind::NotFound, message, stage)
    }

    pub fn transient<S: Into<String>>(message: S, stage: &'static str) -> Self {
        Self::new(ErrorKind::TransientIo, message, stage)
    }

    pub fn not_initialized(stage: &'static str) -> Self {
        Self::new(
            ErrorKind::NotInitialized,
            "Learning profile not loaded - call initialize() first",
            stage,
        )
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Record how many attempts were spent before giving up
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Re-tag an error converted from a lower layer with the stage it surfaced in
    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = stage.to_string();
        self
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)?;
        if let Some(ref model) = self.model {
            write!(f, " (model: {})", model)?;
        }
        if let Some(attempts) = self.attempts {
            write!(f, " (attempts: {})", attempts)?;
        }
        if let Some(ref context) = self.context {
            write!(f, " (context: {})", context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (source: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        // alternate form keeps the whole context chain
        EngineError::transient(format!("{:#}", err), "unknown").with_source("anyhow")
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::TransientIo
        };
        EngineError::new(kind, format!("I/O error: {}", err), "io").with_source("std::io")
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::new(
            ErrorKind::Serialization,
            format!("JSON error: {}", err),
            "json",
        )
        .with_source("serde_json")
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::new(ErrorKind::Config, format!("TOML error: {}", err), "config")
            .with_source("toml")
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::transient(format!("HTTP error: {}", err), "http").with_source("reqwest")
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        EngineError::transient("Operation timed out", "timeout").with_source("tokio::time")
    }
}
