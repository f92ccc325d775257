use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EngineError;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "ADAPTIVE_ENGINE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "adaptive_engine.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub model: ModelConfig,
    pub circuit_breaker: BreakerConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries. Zero disables caching entirely.
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 200,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound for a single attempt. Zero means unbounded.
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
            attempt_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            name: "qwen2.5:7b-instruct".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 60,
            temperature: Some(0.4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u64,
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Size of the list requested from the model
    pub recommendation_count: usize,
    pub target_performance: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            recommendation_count: 5,
            target_performance: crate::difficulty::DEFAULT_TARGET_PERFORMANCE,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str::<EngineConfig>(content)?)
    }

    /// Read and parse a config file. Missing files and parse errors are errors.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", path)))?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(format!("path: {:?}", path)))
    }

    /// Read a config file, falling back to defaults when it is missing or malformed
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                tracing::info!(path = ?path, "Loaded engine config");
                config
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(path = ?path, "No engine config found, using defaults");
                EngineConfig::default()
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to load engine config, using defaults");
                EngineConfig::default()
            }
        }
    }

    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_or_default(&path)
    }
}
