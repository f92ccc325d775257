#![allow(dead_code)]

use adaptive_engine::circuit_breaker::CircuitBreaker;
use adaptive_engine::config::EngineSettings;
use adaptive_engine::error::EngineError;
use adaptive_engine::llm::{CompletionOptions, LanguageModelService, ModelGateway};
use adaptive_engine::metrics::EngineMetrics;
use adaptive_engine::profile::store::ProfileStore;
use adaptive_engine::profile::LearningProfile;
use adaptive_engine::sessions::{
    ContentType, FeedbackSentiment, SessionMetadata, SessionStore, StudySession,
};
use adaptive_engine::{
    AdaptiveLearningEngine, EngineServices, MemoryProfileStore, MemorySessionStore, ResponseCache,
    RetryPolicy,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Model that replays scripted replies in order, then fails
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, EngineError>>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(replies: Vec<Result<String, EngineError>>) -> Self {
        ScriptedModel {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl LanguageModelService for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::transient("model unavailable", "model_call")))
    }
}

/// Model that never answers
pub struct HangingModel;

#[async_trait]
impl LanguageModelService for HangingModel {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String, EngineError> {
        std::future::pending().await
    }
}

/// Profile store whose loads and/or saves fail with a transient error
pub struct FlakyProfileStore {
    pub inner: MemoryProfileStore,
    pub fail_load: bool,
    pub fail_save: bool,
}

#[async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn load(&self, user_id: &str) -> Result<LearningProfile, EngineError> {
        if self.fail_load {
            return Err(EngineError::transient("store offline", "profile_load"));
        }
        self.inner.load(user_id).await
    }

    async fn save(&self, user_id: &str, profile: &LearningProfile) -> Result<(), EngineError> {
        if self.fail_save {
            return Err(EngineError::transient("disk full", "profile_save"));
        }
        self.inner.save(user_id, profile).await
    }
}

pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn append(&self, _session: &StudySession) -> Result<(), EngineError> {
        Err(EngineError::transient("telemetry sink down", "session_append"))
    }

    async fn load_recent(&self, _user_id: &str, _limit: usize) -> Result<Vec<StudySession>, EngineError> {
        Err(EngineError::transient("telemetry sink down", "session_load"))
    }
}

/// Fast retries, no per-attempt timeout
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(2),
        attempt_timeout: None,
    }
}

pub fn gateway(model: Arc<dyn LanguageModelService>) -> Arc<ModelGateway> {
    Arc::new(ModelGateway::new(
        model,
        Arc::new(ResponseCache::new(16, Duration::from_secs(300))),
        quick_retry(),
        CircuitBreaker::new(Duration::from_secs(60), 3),
        EngineMetrics::new(),
    ))
}

pub fn services_with(
    model: Arc<dyn LanguageModelService>,
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<dyn SessionStore>,
) -> EngineServices {
    EngineServices {
        profiles,
        sessions,
        gateway: gateway(model),
        settings: EngineSettings::default(),
    }
}

pub fn memory_services(model: Arc<dyn LanguageModelService>) -> EngineServices {
    services_with(
        model,
        Arc::new(MemoryProfileStore::new()),
        Arc::new(MemorySessionStore::new()),
    )
}

pub async fn initialized_engine(user_id: &str, model: Arc<dyn LanguageModelService>) -> AdaptiveLearningEngine {
    let engine = AdaptiveLearningEngine::new(memory_services(model));
    engine
        .initialize(user_id)
        .await
        .expect("memory store initialize");
    engine
}

pub fn at_hour(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn session(user_id: &str, score: f64) -> StudySession {
    StudySession {
        user_id: user_id.to_string(),
        subject: "mathematics".to_string(),
        topics: vec!["algebra".to_string()],
        duration: 30.0,
        difficulty_level: 50.0,
        performance_score: score,
        engagement_score: 70.0,
        comprehension_rate: 0.8,
        mistakes: Vec::new(),
        feedback_sentiment: FeedbackSentiment::Neutral,
        effectiveness_rating: 4,
        metadata: SessionMetadata::default(),
        timestamp: at_hour(1, 9),
    }
}

pub fn tagged_session(user_id: &str, score: f64, content: ContentType, timestamp: DateTime<Utc>) -> StudySession {
    StudySession {
        metadata: SessionMetadata {
            content_type: Some(content),
            ..SessionMetadata::default()
        },
        timestamp,
        ..session(user_id, score)
    }
}

pub const RECOMMENDATIONS_JSON: &str = r#"Here you go:
```json
{
  "recommendations": [
    {
      "type": "schedule",
      "priority": "low",
      "title": "Study in the morning",
      "description": "Your best scores come before noon.",
      "action": "Move one session a week to 9am",
      "reasoning": "Peak performance window",
      "expected_impact": 0.5,
      "confidence": 0.5
    },
    {
      "type": "method",
      "priority": "high",
      "title": "Use spaced repetition",
      "description": "Review material at growing intervals.",
      "action": "Set up flashcards for algebra",
      "reasoning": "Retention is dropping between sessions",
      "expected_impact": 0.9,
      "confidence": 0.8,
    },
  ]
}
```"#;
