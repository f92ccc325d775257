//! Per-learner profile: style and ability scores, subject mastery,
//! preferences and a bounded performance history.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::sessions::StudySession;

/// Maximum number of `performance_history` entries kept per learner
pub const HISTORY_LIMIT: usize = 100;
/// Starting value for every style and ability score
pub const NEUTRAL_SCORE: f64 = 50.0;
/// Smoothing factor for ability and mastery blending
pub const EMA_ALPHA: f64 = 0.3;

pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// `old * (1 - alpha) + sample * alpha`, clamped to the score range
pub fn ema(old: f64, sample: f64, alpha: f64) -> f64 {
    clamp_score(old * (1.0 - alpha) + sample * alpha)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStyleKind {
    Visual,
    Auditory,
    Reading,
    Kinesthetic,
}

impl LearningStyleKind {
    pub const ALL: [LearningStyleKind; 4] = [
        LearningStyleKind::Visual,
        LearningStyleKind::Auditory,
        LearningStyleKind::Reading,
        LearningStyleKind::Kinesthetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStyleKind::Visual => "visual",
            LearningStyleKind::Auditory => "auditory",
            LearningStyleKind::Reading => "reading",
            LearningStyleKind::Kinesthetic => "kinesthetic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStyle {
    pub visual: f64,
    pub auditory: f64,
    pub reading: f64,
    pub kinesthetic: f64,
}

impl Default for LearningStyle {
    fn default() -> Self {
        LearningStyle {
            visual: NEUTRAL_SCORE,
            auditory: NEUTRAL_SCORE,
            reading: NEUTRAL_SCORE,
            kinesthetic: NEUTRAL_SCORE,
        }
    }
}

impl LearningStyle {
    pub fn get(&self, kind: LearningStyleKind) -> f64 {
        match kind {
            LearningStyleKind::Visual => self.visual,
            LearningStyleKind::Auditory => self.auditory,
            LearningStyleKind::Reading => self.reading,
            LearningStyleKind::Kinesthetic => self.kinesthetic,
        }
    }

    pub fn set(&mut self, kind: LearningStyleKind, value: f64) {
        let value = clamp_score(value);
        match kind {
            LearningStyleKind::Visual => self.visual = value,
            LearningStyleKind::Auditory => self.auditory = value,
            LearningStyleKind::Reading => self.reading = value,
            LearningStyleKind::Kinesthetic => self.kinesthetic = value,
        }
    }

    /// Arg-max of the four scores; the earlier style in `ALL` wins ties
    pub fn dominant(&self) -> (LearningStyleKind, f64) {
        LearningStyleKind::ALL
            .iter()
            .map(|&kind| (kind, self.get(kind)))
            .fold((LearningStyleKind::Visual, f64::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveAbility {
    ProcessingSpeed,
    WorkingMemory,
    AttentionSpan,
    ProblemSolving,
    AnalyticalThinking,
}

impl CognitiveAbility {
    pub const ALL: [CognitiveAbility; 5] = [
        CognitiveAbility::ProcessingSpeed,
        CognitiveAbility::WorkingMemory,
        CognitiveAbility::AttentionSpan,
        CognitiveAbility::ProblemSolving,
        CognitiveAbility::AnalyticalThinking,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveAbilities {
    pub processing_speed: f64,
    pub working_memory: f64,
    pub attention_span: f64,
    pub problem_solving: f64,
    pub analytical_thinking: f64,
}

impl Default for CognitiveAbilities {
    fn default() -> Self {
        CognitiveAbilities::uniform(NEUTRAL_SCORE)
    }
}

impl CognitiveAbilities {
    pub fn uniform(value: f64) -> Self {
        CognitiveAbilities {
            processing_speed: value,
            working_memory: value,
            attention_span: value,
            problem_solving: value,
            analytical_thinking: value,
        }
    }

    pub fn get(&self, ability: CognitiveAbility) -> f64 {
        match ability {
            CognitiveAbility::ProcessingSpeed => self.processing_speed,
            CognitiveAbility::WorkingMemory => self.working_memory,
            CognitiveAbility::AttentionSpan => self.attention_span,
            CognitiveAbility::ProblemSolving => self.problem_solving,
            CognitiveAbility::AnalyticalThinking => self.analytical_thinking,
        }
    }

    pub fn set(&mut self, ability: CognitiveAbility, value: f64) {
        let value = clamp_score(value);
        match ability {
            CognitiveAbility::ProcessingSpeed => self.processing_speed = value,
            CognitiveAbility::WorkingMemory => self.working_memory = value,
            CognitiveAbility::AttentionSpan => self.attention_span = value,
            CognitiveAbility::ProblemSolving => self.problem_solving = value,
            CognitiveAbility::AnalyticalThinking => self.analytical_thinking = value,
        }
    }

    /// Blend freshly computed estimates into these scores via EMA
    pub fn blend(&mut self, computed: &CognitiveAbilities, alpha: f64) {
        for ability in CognitiveAbility::ALL {
            let blended = ema(self.get(ability), computed.get(ability), alpha);
            self.set(ability, blended);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeArea {
    pub mastery_level: f64,
    pub confidence: f64,
    pub last_studied: Option<DateTime<Utc>>,
    pub weak_topics: BTreeSet<String>,
    pub strong_topics: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredDifficulty {
    #[default]
    Adaptive,
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotivationType {
    Gamification,
    #[default]
    Progress,
    Achievement,
    Competition,
}

/// Time-of-day slots used for preferences and peak-performance detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    EarlyMorning,
    #[default]
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 5] = [
        TimeOfDay::EarlyMorning,
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            h if h < 6 => TimeOfDay::EarlyMorning,
            h if h < 12 => TimeOfDay::Morning,
            h if h < 18 => TimeOfDay::Afternoon,
            h if h < 22 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub preferred_difficulty: PreferredDifficulty,
    pub session_length_minutes: u32,
    pub preferred_time_of_day: TimeOfDay,
    pub break_frequency_minutes: u32,
    pub motivation_type: MotivationType,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            preferred_difficulty: PreferredDifficulty::Adaptive,
            session_length_minutes: 30,
            preferred_time_of_day: TimeOfDay::Morning,
            break_frequency_minutes: 25,
            motivation_type: MotivationType::Progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub date: DateTime<Utc>,
    pub subject: String,
    pub topic: String,
    pub score: f64,
    pub time_spent: f64,
    pub difficulty: f64,
    pub comprehension_rate: f64,
}

impl PerformanceEntry {
    pub fn from_session(session: &StudySession) -> Self {
        PerformanceEntry {
            date: session.timestamp,
            subject: session.subject.clone(),
            topic: session.topics.join(", "),
            score: clamp_score(session.performance_score),
            time_spent: session.duration.max(0.0),
            difficulty: session.difficulty_level,
            comprehension_rate: session.comprehension_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningProfile {
    pub user_id: String,
    pub learning_style: LearningStyle,
    pub cognitive_abilities: CognitiveAbilities,
    #[serde(default)]
    pub knowledge_areas: HashMap<String, KnowledgeArea>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub performance_history: VecDeque<PerformanceEntry>,
}

impl LearningProfile {
    /// Default profile: neutral scores, empty history, default preferences
    pub fn new<S: Into<String>>(user_id: S) -> Self {
        LearningProfile {
            user_id: user_id.into(),
            learning_style: LearningStyle::default(),
            cognitive_abilities: CognitiveAbilities::default(),
            knowledge_areas: HashMap::new(),
            preferences: Preferences::default(),
            performance_history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Append to the history, dropping the oldest entries beyond `HISTORY_LIMIT`
    pub fn push_history(&mut self, entry: PerformanceEntry) {
        self.performance_history.push_back(entry);
        while self.performance_history.len() > HISTORY_LIMIT {
            self.performance_history.pop_front();
        }
    }

    pub fn recent_history(&self, n: usize) -> impl Iterator<Item = &PerformanceEntry> {
        let skip = self.performance_history.len().saturating_sub(n);
        self.performance_history.iter().skip(skip)
    }

    /// Mean score of the last `n` history entries, `None` when the history is empty
    pub fn recent_average_score(&self, n: usize) -> Option<f64> {
        let scores: Vec<f64> = self.recent_history(n).map(|e| e.score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    /// Fold a finished session into the subject's knowledge area
    pub fn update_knowledge_area(&mut self, session: &StudySession) {
        let area = self
            .knowledge_areas
            .entry(session.subject.clone())
            .or_insert_with(|| KnowledgeArea {
                mastery_level: NEUTRAL_SCORE,
                confidence: NEUTRAL_SCORE,
                ..KnowledgeArea::default()
            });

        area.mastery_level = ema(area.mastery_level, session.performance_score, EMA_ALPHA);
        area.confidence = ema(area.confidence, session.comprehension_rate * 100.0, EMA_ALPHA);
        area.last_studied = Some(session.timestamp);

        for mistake in session.mistakes.iter().filter(|m| m.frequency >= 2) {
            area.strong_topics.remove(&mistake.topic);
            area.weak_topics.insert(mistake.topic.clone());
        }
        if session.performance_score >= 85.0 {
            for topic in &session.topics {
                if !session.mistakes.iter().any(|m| &m.topic == topic && m.frequency >= 2) {
                    area.weak_topics.remove(topic);
                    area.strong_topics.insert(topic.clone());
                }
            }
        }
    }

    /// Force every score back into `[0, 100]`
    pub fn clamp_scores(&mut self) {
        for kind in LearningStyleKind::ALL {
            let value = self.learning_style.get(kind);
            self.learning_style.set(kind, value);
        }
        for ability in CognitiveAbility::ALL {
            let value = self.cognitive_abilities.get(ability);
            self.cognitive_abilities.set(ability, value);
        }
        for area in self.knowledge_areas.values_mut() {
            area.mastery_level = clamp_score(area.mastery_level);
            area.confidence = clamp_score(area.confidence);
        }
    }
}
