pub mod engine;

pub use engine::{
    BreakerConfig, CacheConfig, EngineConfig, EngineSettings, ModelConfig, RetryConfig,
    CONFIG_ENV_VAR,
};
