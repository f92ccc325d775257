//! Adaptive learning engine: per-learner profiles, study-session analysis,
//! ranked recommendations, multi-week learning paths and difficulty adaptation.
//!
//! Model-backed generation always degrades to a deterministic rule-based
//! result, so callers get a usable answer even when the model is down.

pub mod analysis;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod paths;
pub mod profile;
pub mod recommendations;
pub mod retry;
pub mod sessions;
pub mod strategy;

pub use analysis::{LearningAnalysis, SessionAnalyzer, TrendMetrics};
pub use cache::ResponseCache;
pub use config::EngineConfig;
pub use difficulty::adapt_difficulty;
pub use engine::{AdaptiveLearningEngine, EngineServices, LearnerRegistry};
pub use error::{EngineError, ErrorKind};
pub use llm::{GenerationError, LanguageModelService, ModelGateway, OllamaService};
pub use paths::LearningPath;
pub use profile::store::{JsonProfileStore, MemoryProfileStore, ProfileStore};
pub use profile::LearningProfile;
pub use recommendations::AdaptiveRecommendation;
pub use retry::RetryPolicy;
pub use sessions::{JsonSessionStore, MemorySessionStore, SessionStore, StudySession};
pub use strategy::{Generated, GenerationSource};
