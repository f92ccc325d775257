pub mod registry;

use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::analysis::{LearningAnalysis, SessionAnalyzer};
use crate::config::{EngineConfig, EngineSettings};
use crate::difficulty;
use crate::error::{EngineError, ErrorKind};
use crate::llm::{LanguageModelService, ModelGateway};
use crate::metrics::EngineMetrics;
use crate::paths::{LearningPath, LearningPathGenerator};
use crate::profile::store::ProfileStore;
use crate::profile::{LearningProfile, PerformanceEntry, HISTORY_LIMIT};
use crate::recommendations::{AdaptiveRecommendation, RecommendationEngine};
use crate::sessions::{SessionStore, StudySession};
use crate::strategy::Generated;

pub use registry::LearnerRegistry;

/// Collaborators injected into every engine.
/// The gateway (and its response cache) is shared across learners.
#[derive(Clone)]
pub struct EngineServices {
    pub profiles: Arc<dyn ProfileStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub gateway: Arc<ModelGateway>,
    pub settings: EngineSettings,
}

impl EngineServices {
    pub fn from_config(
        config: &EngineConfig,
        model: Arc<dyn LanguageModelService>,
        profiles: Arc<dyn ProfileStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        EngineServices {
            profiles,
            sessions,
            gateway: Arc::new(ModelGateway::from_config(model, config, EngineMetrics::new())),
            settings: config.engine.clone(),
        }
    }
}

/// Committed per-learner state. Readers clone `Arc`s out and never block
/// on an in-flight update.
#[derive(Default)]
struct EngineState {
    profile: Option<Arc<LearningProfile>>,
    recommendations: Arc<Vec<AdaptiveRecommendation>>,
    learning_path: Option<Arc<LearningPath>>,
    last_analysis: Option<Arc<LearningAnalysis>>,
}

/// Per-learner facade over profile lifecycle, analysis, recommendations,
/// learning paths and difficulty adaptation.
pub struct AdaptiveLearningEngine {
    services: EngineServices,
    analyzer: SessionAnalyzer,
    recommender: RecommendationEngine,
    path_generator: LearningPathGenerator,
    state: RwLock<EngineState>,
    /// Serializes profile mutations (record / analyze / initialize)
    commit_lock: tokio::sync::Mutex<()>,
}

impl AdaptiveLearningEngine {
    pub fn new(services: EngineServices) -> Self {
        let recommender = RecommendationEngine::new(
            Arc::clone(&services.gateway),
            services.settings.recommendation_count,
        );
        let path_generator = LearningPathGenerator::new(Arc::clone(&services.gateway));
        AdaptiveLearningEngine {
            services,
            analyzer: SessionAnalyzer::new(),
            recommender,
            path_generator,
            state: RwLock::new(EngineState::default()),
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the learner's profile, creating and persisting a default one when
    /// none is stored. Store errors other than "not found" propagate, as does
    /// a stored profile that names a different learner.
    pub async fn initialize(&self, user_id: &str) -> Result<Arc<LearningProfile>, EngineError> {
        let _guard = self.commit_lock.lock().await;

        let profile = match self.services.profiles.load(user_id).await {
            Ok(profile) if profile.user_id != user_id => {
                tracing::error!(
                    user_id,
                    stored_user = %profile.user_id,
                    "Stored profile belongs to a different learner"
                );
                return Err(EngineError::new(
                    ErrorKind::Serialization,
                    format!(
                        "Stored profile for '{}' belongs to '{}'",
                        user_id, profile.user_id
                    ),
                    "profile_load",
                ));
            }
            Ok(mut profile) => {
                profile.clamp_scores();
                while profile.performance_history.len() > HISTORY_LIMIT {
                    profile.performance_history.pop_front();
                }
                tracing::info!(
                    user_id,
                    history = profile.performance_history.len(),
                    "Learning profile loaded"
                );
                profile
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(user_id, "No stored profile, creating default");
                let profile = LearningProfile::new(user_id);
                self.services
                    .profiles
                    .save(user_id, &profile)
                    .await
                    .map_err(|e| e.with_context(format!("persisting default profile for {}", user_id)))?;
                profile
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load learning profile");
                return Err(e);
            }
        };

        let profile = Arc::new(profile);
        *self.state.write() = EngineState {
            profile: Some(Arc::clone(&profile)),
            ..EngineState::default()
        };
        Ok(profile)
    }

    fn snapshot(&self, stage: &'static str) -> Result<Arc<LearningProfile>, EngineError> {
        self.state
            .read()
            .profile
            .clone()
            .ok_or_else(|| EngineError::not_initialized(stage))
    }

    fn commit(&self, profile: LearningProfile) -> Arc<LearningProfile> {
        let profile = Arc::new(profile);
        self.state.write().profile = Some(Arc::clone(&profile));
        profile
    }

    async fn persist_best_effort(&self, profile: &LearningProfile) {
        if let Err(e) = self.services.profiles.save(&profile.user_id, profile).await {
            self.services.gateway.metrics().record_persistence_failure();
            tracing::warn!(user_id = %profile.user_id, error = %e, "Failed to persist learning profile");
        }
    }

    /// Fold a finished session into the profile's history and knowledge areas.
    /// A session tagged with another learner is rejected. Persistence and
    /// telemetry failures are logged, never returned.
    pub async fn record_study_session(&self, session: StudySession) -> Result<(), EngineError> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = self.snapshot("record_session")?;

        if session.user_id != snapshot.user_id {
            tracing::warn!(
                user_id = %snapshot.user_id,
                session_user = %session.user_id,
                "Rejecting session tagged with a different learner"
            );
            return Err(EngineError::new(
                ErrorKind::InvalidInput,
                format!(
                    "Session for '{}' recorded on the engine for '{}'",
                    session.user_id, snapshot.user_id
                ),
                "record_session",
            ));
        }

        let mut updated = (*snapshot).clone();
        updated.push_history(PerformanceEntry::from_session(&session));
        updated.update_knowledge_area(&session);
        updated.clamp_scores();
        let committed = self.commit(updated);
        self.services.gateway.metrics().record_session();

        tracing::debug!(
            user_id = %committed.user_id,
            subject = %session.subject,
            score = session.performance_score,
            history = committed.performance_history.len(),
            "Study session recorded"
        );

        self.persist_best_effort(&committed).await;
        if let Err(e) = self.services.sessions.append(&session).await {
            self.services.gateway.metrics().record_persistence_failure();
            tracing::warn!(user_id = %committed.user_id, error = %e, "Failed to append study session");
        }
        Ok(())
    }

    /// Analyze a batch of sessions and commit the updated style and ability scores
    pub async fn analyze_learning_patterns(
        &self,
        sessions: &[StudySession],
    ) -> Result<LearningAnalysis, EngineError> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = self.snapshot("analyze_patterns")?;

        let (analysis, updated) = self.analyzer.analyze(&snapshot, sessions);
        let analysis = Arc::new(analysis);
        self.state.write().last_analysis = Some(Arc::clone(&analysis));

        if !sessions.is_empty() {
            let committed = self.commit(updated);
            self.persist_best_effort(&committed).await;
        }
        Ok((*analysis).clone())
    }

    /// Re-analyze the learner's most recent `limit` stored sessions
    pub async fn analyze_stored_sessions(&self, limit: usize) -> Result<LearningAnalysis, EngineError> {
        let user_id = self.snapshot("analyze_stored")?.user_id.clone();
        let sessions = self.services.sessions.load_recent(&user_id, limit).await?;
        tracing::debug!(user_id = %user_id, loaded = sessions.len(), "Loaded stored sessions for analysis");
        self.analyze_learning_patterns(&sessions).await
    }

    pub async fn generate_recommendations(&self) -> Result<Vec<AdaptiveRecommendation>, EngineError> {
        let generated = self
            .generate_recommendations_with_cancel(&CancellationToken::new())
            .await?;
        Ok(generated.value)
    }

    /// Ranked recommendations. Model failures and cancellation fall back to the
    /// rule-based set; the only error is a missing profile.
    pub async fn generate_recommendations_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Generated<Vec<AdaptiveRecommendation>>, EngineError> {
        let snapshot = self.snapshot("recommendations")?;
        let generated = self.recommender.generate(&snapshot, cancel).await;

        tracing::info!(
            user_id = %snapshot.user_id,
            count = generated.value.len(),
            source = ?generated.source,
            "Recommendations generated"
        );
        self.state.write().recommendations = Arc::new(generated.value.clone());
        Ok(generated)
    }

    pub async fn create_learning_path(&self, goals: &[String], weeks: u32) -> Result<LearningPath, EngineError> {
        let generated = self
            .create_learning_path_with_cancel(goals, weeks, &CancellationToken::new())
            .await?;
        Ok(generated.value)
    }

    pub async fn create_learning_path_with_cancel(
        &self,
        goals: &[String],
        weeks: u32,
        cancel: &CancellationToken,
    ) -> Result<Generated<LearningPath>, EngineError> {
        let snapshot = self.snapshot("learning_path")?;
        let generated = self.path_generator.generate(&snapshot, goals, weeks, cancel).await;

        tracing::info!(
            user_id = %snapshot.user_id,
            path_id = %generated.value.id,
            topics = generated.value.topics.len(),
            weeks = generated.value.estimated_duration_weeks,
            source = ?generated.source,
            "Learning path created"
        );
        self.state.write().learning_path = Some(Arc::new(generated.value.clone()));
        Ok(generated)
    }

    /// Difficulty adjustment against `target`, or the configured target when `None`
    pub fn adapt_difficulty(&self, current_performance: f64, target: Option<f64>) -> f64 {
        difficulty::adapt_difficulty(
            current_performance,
            target.unwrap_or(self.services.settings.target_performance),
        )
    }

    pub fn learning_profile(&self) -> Option<Arc<LearningProfile>> {
        self.state.read().profile.clone()
    }

    pub fn recommendations(&self) -> Arc<Vec<AdaptiveRecommendation>> {
        Arc::clone(&self.state.read().recommendations)
    }

    pub fn current_learning_path(&self) -> Option<Arc<LearningPath>> {
        self.state.read().learning_path.clone()
    }

    pub fn last_analysis(&self) -> Option<Arc<LearningAnalysis>> {
        self.state.read().last_analysis.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().profile.as_ref().map(|p| p.user_id.clone())
    }

    pub fn metrics(&self) -> &EngineMetrics {
        self.services.gateway.metrics()
    }
}
