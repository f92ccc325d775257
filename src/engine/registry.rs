use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{AdaptiveLearningEngine, EngineServices};
use crate::error::EngineError;

/// Multi-tenant container: one initialized engine per learner, all sharing
/// the same services. Different learners never contend on each other's locks.
pub struct LearnerRegistry {
    services: EngineServices,
    engines: RwLock<HashMap<String, Arc<AdaptiveLearningEngine>>>,
}

impl LearnerRegistry {
    pub fn new(services: EngineServices) -> Self {
        LearnerRegistry {
            services,
            engines: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &EngineServices {
        &self.services
    }

    /// Engine for `user_id`, created and initialized on first use
    pub async fn engine_for(&self, user_id: &str) -> Result<Arc<AdaptiveLearningEngine>, EngineError> {
        if let Some(engine) = self.engines.read().get(user_id) {
            return Ok(Arc::clone(engine));
        }

        let engine = Arc::new(AdaptiveLearningEngine::new(self.services.clone()));
        engine.initialize(user_id).await?;

        // another task may have raced us here; keep whichever landed first
        let mut engines = self.engines.write();
        let engine = engines
            .entry(user_id.to_string())
            .or_insert(engine)
            .clone();
        tracing::debug!(user_id, active = engines.len(), "Learner engine ready");
        Ok(engine)
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<AdaptiveLearningEngine>> {
        self.engines.read().get(user_id).cloned()
    }

    /// Drop a learner's engine. Returns whether one was loaded.
    pub fn evict(&self, user_id: &str) -> bool {
        self.engines.write().remove(user_id).is_some()
    }

    pub fn active_learners(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }
}
