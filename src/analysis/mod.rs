//! Session analysis: trend, learning-style and cognitive-ability estimates
//! derived from a batch of study sessions.
//!
//! Everything here is pure. [`SessionAnalyzer::analyze`] reads an immutable
//! profile snapshot and returns the analysis together with the updated
//! profile; committing it is the caller's job.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::profile::{
    clamp_score, CognitiveAbilities, LearningProfile, LearningStyleKind, TimeOfDay, EMA_ALPHA,
};
use crate::sessions::StudySession;

/// Sessions taken from each end of the batch for the improvement estimate
pub const TREND_WINDOW: usize = 10;
/// Bonus applied to the best-performing learning style
pub const STYLE_BOOST: f64 = 10.0;
/// Samples needed for full confidence in a style estimate
const STYLE_CONFIDENCE_SAMPLES: f64 = 5.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendMetrics {
    /// Percent change from the earliest window to the most recent one
    pub overall_improvement: f64,
    /// `100 - stddev(scores)`, floored at zero
    pub consistency: f64,
    pub peak_performance_times: Vec<TimeOfDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleEstimate {
    pub style: LearningStyleKind,
    pub mean_score: f64,
    pub confidence: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningAnalysis {
    pub trends: TrendMetrics,
    /// Styles with at least one tagged session, best first
    pub style_ranking: Vec<StyleEstimate>,
    /// Per-batch estimates before blending into the profile
    pub cognitive_estimates: CognitiveAbilities,
    pub sessions_analyzed: usize,
}

#[derive(Debug, Clone)]
pub struct SessionAnalyzer {
    ema_alpha: f64,
    style_boost: f64,
}

impl Default for SessionAnalyzer {
    fn default() -> Self {
        SessionAnalyzer {
            ema_alpha: EMA_ALPHA,
            style_boost: STYLE_BOOST,
        }
    }
}

impl SessionAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze `sessions` against `profile` and return the analysis plus the
    /// profile with the results folded in.
    ///
    /// An empty batch leaves the profile unchanged.
    pub fn analyze(
        &self,
        profile: &LearningProfile,
        sessions: &[StudySession],
    ) -> (LearningAnalysis, LearningProfile) {
        let analysis = LearningAnalysis {
            trends: analyze_trends(sessions),
            style_ranking: infer_learning_styles(sessions),
            cognitive_estimates: infer_cognitive_abilities(sessions),
            sessions_analyzed: sessions.len(),
        };

        let mut updated = profile.clone();
        if !sessions.is_empty() {
            self.apply(&analysis, &mut updated);
        }

        tracing::debug!(
            user_id = %profile.user_id,
            sessions = sessions.len(),
            improvement = analysis.trends.overall_improvement,
            consistency = analysis.trends.consistency,
            "Learning patterns analyzed"
        );

        (analysis, updated)
    }

    fn apply(&self, analysis: &LearningAnalysis, profile: &mut LearningProfile) {
        if let Some(top) = analysis.style_ranking.first() {
            let boosted = profile.learning_style.get(top.style) + self.style_boost;
            profile.learning_style.set(top.style, boosted);
        }
        profile
            .cognitive_abilities
            .blend(&analysis.cognitive_estimates, self.ema_alpha);
        profile.clamp_scores();
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn analyze_trends(sessions: &[StudySession]) -> TrendMetrics {
    if sessions.len() < 2 {
        return TrendMetrics::default();
    }

    let mut ordered: Vec<&StudySession> = sessions.iter().collect();
    ordered.sort_by_key(|s| s.timestamp);
    let scores: Vec<f64> = ordered.iter().map(|s| s.performance_score).collect();

    let window = TREND_WINDOW.min(scores.len());
    let earlier_avg = mean(&scores[..window]);
    let recent_avg = mean(&scores[scores.len() - window..]);
    let overall_improvement = if earlier_avg.abs() > f64::EPSILON {
        (recent_avg - earlier_avg) / earlier_avg * 100.0
    } else {
        0.0
    };

    let consistency = (100.0 - variance(&scores).sqrt()).max(0.0);

    TrendMetrics {
        overall_improvement,
        consistency,
        peak_performance_times: peak_times(&ordered),
    }
}

fn peak_times(sessions: &[&StudySession]) -> Vec<TimeOfDay> {
    let mut buckets: BTreeMap<TimeOfDay, Vec<f64>> = BTreeMap::new();
    for session in sessions {
        buckets
            .entry(TimeOfDay::from_hour(session.timestamp.hour()))
            .or_default()
            .push(session.performance_score);
    }

    let means: Vec<(TimeOfDay, f64)> = buckets
        .into_iter()
        .map(|(slot, scores)| (slot, mean(&scores)))
        .collect();
    let best = means.iter().map(|(_, m)| *m).fold(f64::MIN, f64::max);

    means
        .into_iter()
        .filter(|(_, m)| (m - best).abs() < 1e-9)
        .map(|(slot, _)| slot)
        .collect()
}

pub fn infer_learning_styles(sessions: &[StudySession]) -> Vec<StyleEstimate> {
    let mut grouped: Vec<(LearningStyleKind, Vec<f64>)> = LearningStyleKind::ALL
        .iter()
        .map(|&kind| (kind, Vec::new()))
        .collect();

    for session in sessions {
        let Some(style) = session
            .metadata
            .content_type
            .and_then(|content| content.learning_style())
        else {
            continue;
        };
        if let Some((_, scores)) = grouped.iter_mut().find(|(kind, _)| *kind == style) {
            scores.push(session.performance_score);
        }
    }

    let mut ranking: Vec<StyleEstimate> = grouped
        .into_iter()
        .filter(|(_, scores)| !scores.is_empty())
        .map(|(style, scores)| StyleEstimate {
            style,
            mean_score: mean(&scores),
            confidence: (scores.len() as f64 / STYLE_CONFIDENCE_SAMPLES).min(1.0),
            samples: scores.len(),
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.mean_score
            .partial_cmp(&a.mean_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranking
}

/// Per-session accumulation divided by the whole batch size, so categories
/// with few qualifying sessions are pulled toward zero.
pub fn infer_cognitive_abilities(sessions: &[StudySession]) -> CognitiveAbilities {
    let mut totals = CognitiveAbilities::uniform(0.0);
    if sessions.is_empty() {
        return totals;
    }

    for session in sessions {
        let score = session.performance_score;
        if score > 0.0 {
            totals.processing_speed += (100.0 - session.duration / (score / 100.0)).max(0.0);
        }
        if session.metadata.is_high_complexity() {
            totals.working_memory += score;
        }
        totals.attention_span += session.engagement_score;
        if session.metadata.is_novel_problem() {
            totals.problem_solving += score;
        }
        if session.metadata.is_analysis_skill() {
            totals.analytical_thinking += score;
        }
    }

    let n = sessions.len() as f64;
    CognitiveAbilities {
        processing_speed: clamp_score(totals.processing_speed / n),
        working_memory: clamp_score(totals.working_memory / n),
        attention_span: clamp_score(totals.attention_span / n),
        problem_solving: clamp_score(totals.problem_solving / n),
        analytical_thinking: clamp_score(totals.analytical_thinking / n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{ContentType, FeedbackSentiment, SessionMetadata};
    use chrono::{TimeZone, Utc};

    fn session(score: f64, hour: u32, minute: u32) -> StudySession {
        StudySession {
            user_id: "u1".into(),
            subject: "math".into(),
            topics: vec!["algebra".into()],
            duration: 20.0,
            difficulty_level: 50.0,
            performance_score: score,
            engagement_score: 70.0,
            comprehension_rate: 0.8,
            mistakes: vec![],
            feedback_sentiment: FeedbackSentiment::Neutral,
            effectiveness_rating: 4,
            metadata: SessionMetadata::default(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_short_batches_have_zero_trends() {
        assert_eq!(analyze_trends(&[]), TrendMetrics::default());
        assert_eq!(analyze_trends(&[session(90.0, 9, 0)]), TrendMetrics::default());
    }

    #[test]
    fn test_improvement_between_windows() {
        let mut sessions: Vec<StudySession> = (0..10).map(|i| session(50.0, 9, i)).collect();
        sessions.extend((0..10).map(|i| session(75.0, 10, i)));
        let trends = analyze_trends(&sessions);
        assert!((trends.overall_improvement - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_scores_are_fully_consistent() {
        let sessions: Vec<StudySession> = (0..4).map(|i| session(80.0, 9, i)).collect();
        assert_eq!(analyze_trends(&sessions).consistency, 100.0);
    }

    #[test]
    fn test_peak_times_include_ties() {
        let sessions = vec![
            session(90.0, 8, 0),
            session(90.0, 14, 0),
            session(60.0, 20, 0),
        ];
        let peaks = analyze_trends(&sessions).peak_performance_times;
        assert_eq!(peaks, vec![TimeOfDay::Morning, TimeOfDay::Afternoon]);
    }

    #[test]
    fn test_style_ranking_and_confidence() {
        let mut video = session(90.0, 9, 0);
        video.metadata.content_type = Some(ContentType::Video);
        let mut text = session(60.0, 9, 1);
        text.metadata.content_type = Some(ContentType::Text);
        let untagged = session(100.0, 9, 2);

        let ranking = infer_learning_styles(&[text.clone(), video, text, untagged]);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].style, LearningStyleKind::Visual);
        assert!((ranking[0].confidence - 0.2).abs() < 1e-9);
        assert_eq!(ranking[1].style, LearningStyleKind::Reading);
        assert_eq!(ranking[1].samples, 2);
    }

    #[test]
    fn test_sparse_categories_normalize_over_whole_batch() {
        let mut complex = session(80.0, 9, 0);
        complex.metadata.complexity = Some("high".into());
        let plain = session(80.0, 9, 1);

        let abilities = infer_cognitive_abilities(&[complex, plain]);
        assert!((abilities.working_memory - 40.0).abs() < 1e-9);
        assert!((abilities.attention_span - 70.0).abs() < 1e-9);
        assert_eq!(abilities.problem_solving, 0.0);
        // 100 - 20 / 0.8 = 75
        assert!((abilities.processing_speed - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_score_does_not_poison_processing_speed() {
        let abilities = infer_cognitive_abilities(&[session(0.0, 9, 0)]);
        assert_eq!(abilities.processing_speed, 0.0);
    }
}
