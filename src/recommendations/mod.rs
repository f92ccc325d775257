//! Ranked improvement recommendations, model-generated with a rule-based fallback.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{fingerprint, ResponseCache};
use crate::llm::json::parse_validated;
use crate::llm::{CompletionOptions, GenerationError, GenerationRequest, ModelGateway, Validate};
use crate::profile::{LearningProfile, LearningStyleKind};
use crate::strategy::{attempt_then_fallback, Generated};

/// History entries embedded in the prompt and averaged by the difficulty rule
const RECENT_WINDOW: usize = 5;
/// Recent average below which the rule-based path suggests easier material
const STRUGGLING_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Content,
    Difficulty,
    Pacing,
    Method,
    Schedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn weight(&self) -> f64 {
        match self {
            Priority::High => 3.0,
            Priority::Medium => 2.0,
            Priority::Low => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRecommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub action: String,
    pub reasoning: String,
    /// In `[0, 1]`
    pub expected_impact: f64,
    /// In `[0, 1]`
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AdaptiveRecommendation {
    /// `priority weight × expected impact × confidence`
    pub fn rank_score(&self) -> f64 {
        self.priority.weight() * self.expected_impact * self.confidence
    }
}

/// Sort descending by [`AdaptiveRecommendation::rank_score`]. Ties keep their input order.
pub fn rank_recommendations(mut recommendations: Vec<AdaptiveRecommendation>) -> Vec<AdaptiveRecommendation> {
    recommendations.sort_by(|a, b| {
        b.rank_score()
            .partial_cmp(&a.rank_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    recommendations
}

/// Shape the model is asked to return
#[derive(Debug, Clone, Deserialize)]
struct RecommendationPayload {
    recommendations: Vec<AdaptiveRecommendation>,
}

fn unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

impl Validate for RecommendationPayload {
    fn validate(&self) -> Result<(), GenerationError> {
        if self.recommendations.is_empty() {
            return Err(GenerationError::Schema("no recommendations returned".into()));
        }
        for (i, rec) in self.recommendations.iter().enumerate() {
            if rec.title.trim().is_empty() || rec.action.trim().is_empty() {
                return Err(GenerationError::Schema(format!(
                    "recommendation {} is missing a title or action",
                    i
                )));
            }
            if !unit_interval(rec.expected_impact) || !unit_interval(rec.confidence) {
                return Err(GenerationError::Schema(format!(
                    "recommendation {} has impact/confidence outside [0, 1]",
                    i
                )));
            }
        }
        Ok(())
    }
}

pub struct RecommendationEngine {
    gateway: Arc<ModelGateway>,
    count: usize,
}

impl RecommendationEngine {
    pub fn new(gateway: Arc<ModelGateway>, count: usize) -> Self {
        RecommendationEngine {
            gateway,
            count: count.max(1),
        }
    }

    /// Model-backed recommendations, or the rule-based set on any failure or
    /// cancellation. Either way the result is ranked.
    pub async fn generate(
        &self,
        profile: &LearningProfile,
        cancel: &CancellationToken,
    ) -> Generated<Vec<AdaptiveRecommendation>> {
        let generated = attempt_then_fallback(
            "recommendations",
            &profile.user_id,
            cancel,
            self.gateway.metrics(),
            self.generate_with_model(profile),
            || rule_based_recommendations(profile),
        )
        .await;

        Generated {
            value: rank_recommendations(generated.value),
            source: generated.source,
        }
    }

    async fn generate_with_model(
        &self,
        profile: &LearningProfile,
    ) -> Result<Vec<AdaptiveRecommendation>, GenerationError> {
        let prompt = self.build_prompt(profile)?;
        let request = GenerationRequest {
            stage: "recommendations",
            cache_key: Some(ResponseCache::key(
                "recommendations",
                &profile.user_id,
                &fingerprint(&prompt),
            )),
            prompt,
            options: CompletionOptions {
                json_mode: true,
                ..CompletionOptions::default()
            },
        };

        let count = self.count;
        self.gateway
            .generate(request, |text| {
                let mut payload = parse_validated::<RecommendationPayload>(text)?;
                payload.recommendations.truncate(count);
                Ok(payload.recommendations)
            })
            .await
    }

    pub fn build_prompt(&self, profile: &LearningProfile) -> Result<String, GenerationError> {
        let recent: Vec<_> = profile.recent_history(RECENT_WINDOW).collect();
        Ok(format!(
            r#"You are an adaptive learning coach. Analyze this learner profile and suggest exactly {count} improvements.

Learning style scores (0-100): {style}
Cognitive ability scores (0-100): {abilities}
Preferences: {preferences}
Last {window} study results: {recent}

Return ONLY valid JSON in the following schema:

{{
  "recommendations": [
    {{
      "type": "content" | "difficulty" | "pacing" | "method" | "schedule",
      "priority": "high" | "medium" | "low",
      "title": "short title",
      "description": "what to change",
      "action": "one concrete next step",
      "reasoning": "why, citing the profile",
      "expected_impact": 0.0 to 1.0,
      "confidence": 0.0 to 1.0
    }}
  ]
}}"#,
            count = self.count,
            style = to_json(&profile.learning_style)?,
            abilities = to_json(&profile.cognitive_abilities)?,
            preferences = to_json(&profile.preferences)?,
            window = RECENT_WINDOW,
            recent = to_json(&recent)?,
        ))
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, GenerationError> {
    serde_json::to_string(value).map_err(|e| GenerationError::Schema(e.to_string()))
}

fn style_advice(style: LearningStyleKind) -> (&'static str, &'static str) {
    match style {
        LearningStyleKind::Visual => (
            "diagrams, videos and mind maps",
            "Turn your next topic into a diagram or watch a short video walkthrough",
        ),
        LearningStyleKind::Auditory => (
            "lectures, podcasts and explaining ideas aloud",
            "Listen to a recorded explanation, then explain the topic out loud",
        ),
        LearningStyleKind::Reading => (
            "texts, written summaries and note taking",
            "Read a focused chapter and write a one-page summary",
        ),
        LearningStyleKind::Kinesthetic => (
            "hands-on exercises and interactive practice",
            "Work through an interactive exercise or build a small example",
        ),
    }
}

/// Deterministic recommendations from the profile alone
pub fn rule_based_recommendations(profile: &LearningProfile) -> Vec<AdaptiveRecommendation> {
    let mut recommendations = Vec::new();

    let (style, score) = profile.learning_style.dominant();
    let (materials, action) = style_advice(style);
    recommendations.push(AdaptiveRecommendation {
        kind: RecommendationType::Content,
        priority: Priority::High,
        title: format!("Favor {} learning materials", style.as_str()),
        description: format!("You learn best with {}.", materials),
        action: action.to_string(),
        reasoning: format!(
            "Your {} learning score ({:.0}) is the highest of your learning styles.",
            style.as_str(),
            score
        ),
        expected_impact: 0.8,
        confidence: 0.7,
        metadata: HashMap::from([
            ("style".to_string(), serde_json::json!(style.as_str())),
            ("score".to_string(), serde_json::json!(score)),
        ]),
    });

    if let Some(average) = profile.recent_average_score(RECENT_WINDOW) {
        if average < STRUGGLING_THRESHOLD {
            recommendations.push(AdaptiveRecommendation {
                kind: RecommendationType::Difficulty,
                priority: Priority::High,
                title: "Reduce difficulty".to_string(),
                description: "Step back to easier material until scores recover.".to_string(),
                action: "Review fundamentals and practice easier problems before moving on".to_string(),
                reasoning: format!(
                    "Your average over the last {} sessions is {:.1}, below {:.0}.",
                    RECENT_WINDOW, average, STRUGGLING_THRESHOLD
                ),
                expected_impact: 0.9,
                confidence: 0.8,
                metadata: HashMap::from([(
                    "recent_average".to_string(),
                    serde_json::json!(average),
                )]),
            });
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{LearningStyle, PerformanceEntry};
    use chrono::Utc;

    fn rec(title: &str, priority: Priority, impact: f64, confidence: f64) -> AdaptiveRecommendation {
        AdaptiveRecommendation {
            kind: RecommendationType::Method,
            priority,
            title: title.to_string(),
            description: String::new(),
            action: "do it".to_string(),
            reasoning: String::new(),
            expected_impact: impact,
            confidence,
            metadata: HashMap::new(),
        }
    }

    fn entry(score: f64) -> PerformanceEntry {
        PerformanceEntry {
            date: Utc::now(),
            subject: "math".into(),
            topic: "algebra".into(),
            score,
            time_spent: 30.0,
            difficulty: 50.0,
            comprehension_rate: 0.7,
        }
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let ranked = rank_recommendations(vec![
            rec("low", Priority::Low, 1.0, 1.0),         // 1.0
            rec("tie-a", Priority::Medium, 0.5, 1.0),    // 1.0
            rec("top", Priority::High, 0.8, 0.9),        // 2.16
            rec("tie-b", Priority::High, 0.5, 2.0 / 3.0), // 1.0
        ]);
        let titles: Vec<&str> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["top", "low", "tie-a", "tie-b"]);
    }

    #[test]
    fn test_rule_based_uses_dominant_style() {
        let mut profile = LearningProfile::new("u1");
        profile.learning_style = LearningStyle {
            kinesthetic: 88.0,
            ..LearningStyle::default()
        };
        let recs = rule_based_recommendations(&profile);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationType::Content);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].metadata["style"], "kinesthetic");
    }

    #[test]
    fn test_rule_based_reduces_difficulty_when_struggling() {
        let mut profile = LearningProfile::new("u1");
        for score in [95.0, 95.0, 60.0, 65.0, 70.0, 62.0, 68.0] {
            profile.push_history(entry(score));
        }
        let recs = rule_based_recommendations(&profile);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].kind, RecommendationType::Difficulty);
        assert_eq!(recs[1].title, "Reduce difficulty");
    }

    #[test]
    fn test_rule_based_skips_difficulty_at_threshold() {
        let mut profile = LearningProfile::new("u1");
        for _ in 0..5 {
            profile.push_history(entry(70.0));
        }
        assert_eq!(rule_based_recommendations(&profile).len(), 1);
    }

    #[test]
    fn test_payload_validation_rejects_out_of_range_confidence() {
        let payload = RecommendationPayload {
            recommendations: vec![rec("x", Priority::Low, 0.5, 1.5)],
        };
        assert!(matches!(payload.validate(), Err(GenerationError::Schema(_))));

        let empty = RecommendationPayload {
            recommendations: vec![],
        };
        assert!(empty.validate().is_err());
    }
}
