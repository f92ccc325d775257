use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::error::EngineError;
use crate::profile::store::file_stem;
use crate::profile::LearningStyleKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mistake {
    pub topic: String,
    pub error_type: String,
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Audio,
    Text,
    Interactive,
    #[serde(other)]
    Other,
}

impl ContentType {
    pub fn learning_style(&self) -> Option<LearningStyleKind> {
        match self {
            ContentType::Video => Some(LearningStyleKind::Visual),
            ContentType::Audio => Some(LearningStyleKind::Auditory),
            ContentType::Text => Some(LearningStyleKind::Reading),
            ContentType::Interactive => Some(LearningStyleKind::Kinesthetic),
            ContentType::Other => None,
        }
    }
}

/// Optional tags the analyzer keys its inferences on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub content_type: Option<ContentType>,
    /// e.g. "high"
    pub complexity: Option<String>,
    /// e.g. "novel"
    pub problem_type: Option<String>,
    /// e.g. "analysis"
    pub skill_type: Option<String>,
}

impl SessionMetadata {
    pub fn is_high_complexity(&self) -> bool {
        matches_tag(&self.complexity, "high")
    }

    pub fn is_novel_problem(&self) -> bool {
        matches_tag(&self.problem_type, "novel")
    }

    pub fn is_analysis_skill(&self) -> bool {
        matches_tag(&self.skill_type, "analysis")
    }
}

fn matches_tag(tag: &Option<String>, expected: &str) -> bool {
    tag.as_deref()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case(expected))
}

/// One completed study activity, as reported by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub user_id: String,
    pub subject: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Minutes
    pub duration: f64,
    pub difficulty_level: f64,
    pub performance_score: f64,
    pub engagement_score: f64,
    /// Fraction in `[0, 1]`
    pub comprehension_rate: f64,
    #[serde(default)]
    pub mistakes: Vec<Mistake>,
    #[serde(default)]
    pub feedback_sentiment: FeedbackSentiment,
    /// 1 to 5
    pub effectiveness_rating: u8,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget telemetry sink for study sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, session: &StudySession) -> Result<(), EngineError>;

    /// Most recent `limit` sessions for a learner, oldest first
    async fn load_recent(&self, user_id: &str, limit: usize) -> Result<Vec<StudySession>, EngineError>;
}

/// Append-only JSON-lines file per learner under `<root>/sessions/`
pub struct JsonSessionStore {
    root: PathBuf,
}

impl JsonSessionStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        JsonSessionStore { root: root.into() }
    }

    pub fn sessions_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join("sessions")
            .join(format!("{}.jsonl", file_stem(user_id)))
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn append(&self, session: &StudySession) -> Result<(), EngineError> {
        let path = self.sessions_path(&session.user_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", parent)))?;
        }

        let mut line = serde_json::to_string(session)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", path)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", path)))?;
        file.flush().await?;
        Ok(())
    }

    async fn load_recent(&self, user_id: &str, limit: usize) -> Result<Vec<StudySession>, EngineError> {
        let path = self.sessions_path(user_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::from(e).with_context(format!("path: {:?}", path)));
            }
        };

        let mut sessions = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StudySession>(line) {
                Ok(session) if session.user_id == user_id => sessions.push(session),
                Ok(session) => {
                    tracing::warn!(
                        path = ?path,
                        line = line_no + 1,
                        session_user = %session.user_id,
                        "Skipping session filed under another learner"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        path = ?path,
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable session record"
                    );
                }
            }
        }

        sessions.sort_by_key(|s| s.timestamp);
        let skip = sessions.len().saturating_sub(limit);
        Ok(sessions.split_off(skip))
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<StudySession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, user_id: &str) -> usize {
        self.sessions.read().get(user_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append(&self, session: &StudySession) -> Result<(), EngineError> {
        self.sessions
            .write()
            .entry(session.user_id.clone())
            .or_default()
            .push(session.clone());
        Ok(())
    }

    async fn load_recent(&self, user_id: &str, limit: usize) -> Result<Vec<StudySession>, EngineError> {
        let guard = self.sessions.read();
        let Some(all) = guard.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut sorted = all.clone();
        sorted.sort_by_key(|s| s.timestamp);
        let skip = sorted.len().saturating_sub(limit);
        Ok(sorted.split_off(skip))
    }
}
