//! Multi-week learning paths: model-generated curriculum with a template fallback.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{fingerprint, ResponseCache};
use crate::llm::json::extract_json;
use crate::llm::{CompletionOptions, GenerationError, GenerationRequest, ModelGateway, Validate};
use crate::profile::{LearningProfile, LearningStyleKind};
use crate::strategy::{attempt_then_fallback, Generated};

const SUCCESS_CRITERIA: [&str; 3] = [
    "Complete assigned topics",
    "Score at least 70% on practice tests",
    "Submit weekly reflection",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTopic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub estimated_hours: u32,
    /// `[0, 100]`
    pub difficulty: f64,
    /// `[0, 100]`
    pub importance: f64,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub recommended_resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// 1-based week the milestone falls due
    pub week: u32,
    pub description: String,
    pub success_criteria: Vec<String>,
    pub assessment_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub estimated_duration_weeks: u32,
    /// One entry per week
    pub difficulty_progression: Vec<f64>,
    pub topics: Vec<PathTopic>,
    pub milestones: Vec<Milestone>,
}

impl LearningPath {
    /// Check the structural invariants every path must satisfy:
    /// a week-long progression, prerequisites pointing only backwards,
    /// scores in range and milestones inside the time frame.
    pub fn check(&self) -> Result<(), String> {
        let weeks = self.estimated_duration_weeks;
        if weeks == 0 {
            return Err("path must span at least one week".into());
        }
        if self.difficulty_progression.len() != weeks as usize {
            return Err(format!(
                "difficulty_progression has {} entries for {} weeks",
                self.difficulty_progression.len(),
                weeks
            ));
        }
        if self
            .difficulty_progression
            .iter()
            .any(|d| !d.is_finite() || !(0.0..=100.0).contains(d))
        {
            return Err("difficulty_progression values must be in [0, 100]".into());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for topic in &self.topics {
            if topic.id.trim().is_empty() || topic.name.trim().is_empty() {
                return Err("topic is missing an id or name".into());
            }
            for prereq in &topic.prerequisites {
                if !seen.contains(prereq.as_str()) {
                    return Err(format!(
                        "topic {} depends on {} which does not come before it",
                        topic.id, prereq
                    ));
                }
            }
            for score in [topic.difficulty, topic.importance] {
                if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                    return Err(format!("topic {} has a score outside [0, 100]", topic.id));
                }
            }
            if !seen.insert(topic.id.as_str()) {
                return Err(format!("duplicate topic id {}", topic.id));
            }
        }

        if let Some(m) = self.milestones.iter().find(|m| m.week == 0 || m.week > weeks) {
            return Err(format!("milestone week {} outside 1..={}", m.week, weeks));
        }
        Ok(())
    }
}

/// Model output is a path without an id; the generator assigns one
#[derive(Debug, Clone, Deserialize)]
struct PathPayload {
    #[serde(flatten)]
    path: LearningPath,
    #[serde(skip)]
    requested_weeks: u32,
}

impl Validate for PathPayload {
    fn validate(&self) -> Result<(), GenerationError> {
        if self.path.topics.is_empty() {
            return Err(GenerationError::Schema("path has no topics".into()));
        }
        if self.requested_weeks != 0 && self.path.estimated_duration_weeks != self.requested_weeks {
            return Err(GenerationError::Schema(format!(
                "path spans {} weeks, {} requested",
                self.path.estimated_duration_weeks, self.requested_weeks
            )));
        }
        self.path.check().map_err(GenerationError::Schema)
    }
}

fn path_id(user_id: &str) -> String {
    format!("path_{}_{}", user_id, Utc::now().timestamp_millis())
}

fn resources_for(style: LearningStyleKind, goal: &str) -> Vec<String> {
    match style {
        LearningStyleKind::Visual => vec![
            format!("Video lectures on {}", goal),
            format!("Concept maps and diagrams for {}", goal),
        ],
        LearningStyleKind::Auditory => vec![
            format!("Podcast or recorded lectures on {}", goal),
            format!("Study group discussion of {}", goal),
        ],
        LearningStyleKind::Reading => vec![
            format!("Textbook chapters on {}", goal),
            format!("Written summaries and notes for {}", goal),
        ],
        LearningStyleKind::Kinesthetic => vec![
            format!("Interactive exercises for {}", goal),
            format!("Hands-on project applying {}", goal),
        ],
    }
}

/// Deterministic path: one topic per goal chained in order, a linear
/// difficulty ramp and a milestone every two weeks.
///
/// A zero time frame is treated as one week.
pub fn template_path(profile: &LearningProfile, goals: &[String], weeks: u32) -> LearningPath {
    let weeks = weeks.max(1);
    let goal_count = goals.len();
    let (style, _) = profile.learning_style.dominant();

    let topics: Vec<PathTopic> = goals
        .iter()
        .enumerate()
        .map(|(i, goal)| {
            let prerequisites = if i > 0 {
                vec![format!("topic_{}", i)]
            } else {
                Vec::new()
            };
            PathTopic {
                id: format!("topic_{}", i + 1),
                name: goal.clone(),
                prerequisites,
                estimated_hours: (weeks as f64 * 5.0 / goal_count as f64).ceil() as u32,
                difficulty: 30.0 + (i as f64 / goal_count as f64) * 50.0,
                importance: (100.0 - i as f64 * 10.0).max(0.0),
                learning_objectives: vec![
                    format!("Understand the core concepts of {}", goal),
                    format!("Apply {} to practice problems", goal),
                ],
                recommended_resources: resources_for(style, goal),
            }
        })
        .collect();

    let difficulty_progression = (0..weeks)
        .map(|w| (30.0 + (w as f64 / weeks as f64) * 70.0).min(100.0))
        .collect();

    let milestone_count = weeks.div_ceil(2);
    let milestones = (1..=milestone_count)
        .map(|k| {
            let week = (2 * k).min(weeks);
            Milestone {
                week,
                description: format!("Week {} checkpoint", week),
                success_criteria: SUCCESS_CRITERIA.iter().map(|s| s.to_string()).collect(),
                assessment_type: if k == milestone_count {
                    "final_assessment".to_string()
                } else {
                    "practice_test".to_string()
                },
            }
        })
        .collect();

    LearningPath {
        id: path_id(&profile.user_id),
        name: format!("{}-week plan: {}", weeks, goals.join(", ")),
        description: format!(
            "Structured path through {} goal(s), paced for a {} learner",
            goal_count,
            style.as_str()
        ),
        estimated_duration_weeks: weeks,
        difficulty_progression,
        topics,
        milestones,
    }
}

pub struct LearningPathGenerator {
    gateway: Arc<ModelGateway>,
}

impl LearningPathGenerator {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        LearningPathGenerator { gateway }
    }

    /// Model-generated path, or [`template_path`] on any failure or cancellation
    pub async fn generate(
        &self,
        profile: &LearningProfile,
        goals: &[String],
        weeks: u32,
        cancel: &CancellationToken,
    ) -> Generated<LearningPath> {
        attempt_then_fallback(
            "learning_path",
            &profile.user_id,
            cancel,
            self.gateway.metrics(),
            self.generate_with_model(profile, goals, weeks.max(1)),
            || template_path(profile, goals, weeks),
        )
        .await
    }

    async fn generate_with_model(
        &self,
        profile: &LearningProfile,
        goals: &[String],
        weeks: u32,
    ) -> Result<LearningPath, GenerationError> {
        if goals.is_empty() {
            return Err(GenerationError::Schema("no goals to plan for".into()));
        }

        let prompt = build_prompt(profile, goals, weeks)?;
        let request = GenerationRequest {
            stage: "learning_path",
            cache_key: Some(ResponseCache::key(
                "learning_path",
                &profile.user_id,
                &fingerprint(&prompt),
            )),
            prompt,
            options: CompletionOptions {
                json_mode: true,
                ..CompletionOptions::default()
            },
        };

        let mut path = self
            .gateway
            .generate(request, |text| {
                let json = extract_json(text)?;
                let mut payload: PathPayload = serde_json::from_str(&json)
                    .map_err(|e| GenerationError::Schema(e.to_string()))?;
                payload.requested_weeks = weeks;
                payload.validate()?;
                Ok(payload.path)
            })
            .await?;

        path.id = path_id(&profile.user_id);
        Ok(path)
    }
}

pub fn build_prompt(profile: &LearningProfile, goals: &[String], weeks: u32) -> Result<String, GenerationError> {
    let json = |value: serde_json::Result<String>| value.map_err(|e| GenerationError::Schema(e.to_string()));

    Ok(format!(
        r#"You are a curriculum designer. Build a {weeks}-week learning path for these goals: {goals}

Learner style scores (0-100): {style}
Learner cognitive ability scores (0-100): {abilities}
Preferences: {preferences}

Rules:
- difficulty_progression has exactly {weeks} numbers between 0 and 100
- a topic's prerequisites may only list ids of topics that appear before it
- milestone weeks are between 1 and {weeks}

Return ONLY valid JSON in the following schema:

{{
  "name": "path title",
  "description": "one paragraph",
  "estimated_duration_weeks": {weeks},
  "difficulty_progression": [30, 42, ...],
  "topics": [
    {{
      "id": "topic_1",
      "name": "topic name",
      "prerequisites": [],
      "estimated_hours": 10,
      "difficulty": 0-100,
      "importance": 0-100,
      "learning_objectives": ["..."],
      "recommended_resources": ["..."]
    }}
  ],
  "milestones": [
    {{
      "week": 2,
      "description": "...",
      "success_criteria": ["..."],
      "assessment_type": "quiz" | "project" | "practice_test"
    }}
  ]
}}"#,
        weeks = weeks,
        goals = json(serde_json::to_string(goals))?,
        style = json(serde_json::to_string(&profile.learning_style))?,
        abilities = json(serde_json::to_string(&profile.cognitive_abilities))?,
        preferences = json(serde_json::to_string(&profile.preferences))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goals(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_template_three_goals_six_weeks() {
        let profile = LearningProfile::new("u1");
        let path = template_path(&profile, &goals(&["A", "B", "C"]), 6);

        assert_eq!(path.topics.len(), 3);
        assert!(path.topics[0].prerequisites.is_empty());
        assert_eq!(path.topics[1].prerequisites, vec![path.topics[0].id.clone()]);
        assert_eq!(path.topics[2].prerequisites, vec![path.topics[1].id.clone()]);

        let weeks: Vec<u32> = path.milestones.iter().map(|m| m.week).collect();
        assert_eq!(weeks, vec![2, 4, 6]);
        assert!(path.milestones.iter().all(|m| m.success_criteria.len() == 3));

        assert_eq!(path.topics[0].estimated_hours, 10);
        assert!((path.topics[1].difficulty - 46.666).abs() < 0.01);
        assert_eq!(path.topics[2].importance, 80.0);
        assert!(path.check().is_ok());
    }

    #[test]
    fn test_progression_ramps_per_week() {
        let profile = LearningProfile::new("u1");
        let path = template_path(&profile, &goals(&["A"]), 4);
        assert_eq!(path.difficulty_progression, vec![30.0, 47.5, 65.0, 82.5]);
    }

    #[test]
    fn test_odd_weeks_clamp_final_milestone_to_last_week_instead_of_week_six() {
        let profile = LearningProfile::new("u1");
        let path = template_path(&profile, &goals(&["A", "B"]), 5);
        let weeks: Vec<u32> = path.milestones.iter().map(|m| m.week).collect();
        // a plain every-two-weeks rule would land at week 6, past the end of the path
        assert_eq!(weeks, vec![2, 4, 5]);
        assert!(path.check().is_ok());
        assert_eq!(path.milestones[2].assessment_type, "final_assessment");
    }

    #[test]
    fn test_zero_weeks_and_no_goals() {
        let profile = LearningProfile::new("u1");
        let path = template_path(&profile, &[], 0);
        assert_eq!(path.estimated_duration_weeks, 1);
        assert_eq!(path.difficulty_progression.len(), 1);
        assert!(path.topics.is_empty());
        assert_eq!(path.milestones.len(), 1);
        assert!(path.check().is_ok());
    }

    #[test]
    fn test_importance_never_negative() {
        let profile = LearningProfile::new("u1");
        let many: Vec<String> = (0..12).map(|i| format!("goal {}", i)).collect();
        let path = template_path(&profile, &many, 12);
        assert_eq!(path.topics[11].importance, 0.0);
        assert!(path.check().is_ok());
    }

    #[test]
    fn test_check_rejects_forward_prerequisite() {
        let profile = LearningProfile::new("u1");
        let mut path = template_path(&profile, &goals(&["A", "B"]), 2);
        path.topics[0].prerequisites = vec!["topic_2".to_string()];
        assert!(path.check().is_err());
    }
}
