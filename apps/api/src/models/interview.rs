use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle of an interview session.
///
/// `InProgress → Analyzing → {Done | Failed}`, plus the manual regeneration
/// edge `{Done | Failed} → Analyzing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Analyzing,
    Done,
    Failed,
}

impl SessionStatus {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Analyzing => "analyzing",
            SessionStatus::Done => "done",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn can_regenerate(self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Analyzing => "ANALYZING",
            SessionStatus::Done => "DONE",
            SessionStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "analyzing" => Ok(SessionStatus::Analyzing),
            "done" => Ok(SessionStatus::Done),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(UnknownVariant {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Analyzing,
    Done,
    Failed,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Analyzing => "analyzing",
            ReportStatus::Done => "done",
            ReportStatus::Failed => "failed",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyzing" => Ok(ReportStatus::Analyzing),
            "done" => Ok(ReportStatus::Done),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(UnknownVariant {
                kind: "report status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Base,
    Followup,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Base => "base",
            QuestionType::Followup => "followup",
        }
    }
}

impl FromStr for QuestionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(QuestionType::Base),
            "followup" => Ok(QuestionType::Followup),
            other => Err(UnknownVariant {
                kind: "question type",
                value: other.to_string(),
            }),
        }
    }
}

/// Main topic plus the sub-topics the interview draws questions from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub main_topic_id: String,
    #[serde(default)]
    pub sub_topic_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: String,
    /// `None` for anonymous sessions.
    pub owner_id: Option<String>,
    pub title: Option<String>,
    pub topic: Topic,
    pub status: SessionStatus,
    /// 1-based, never decreases.
    pub current_turn: i32,
    /// Consecutive follow-up questions issued, 0..=2.
    pub followup_streak: i32,
    pub turn_limit_sec: i32,
    pub total_limit_sec: i32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// True when the session belongs to someone other than `caller`.
    /// Anonymous sessions are accessible to everyone.
    pub fn is_owned_by_other(&self, caller: Option<&str>) -> bool {
        match self.owner_id.as_deref() {
            Some(owner) => caller != Some(owner),
            None => false,
        }
    }

    /// Whole seconds between start and end, if the session has ended.
    pub fn elapsed_secs(&self) -> Option<i32> {
        self.ended_at.map(|ended| {
            let secs = (ended - self.started_at).num_seconds().max(0);
            i32::try_from(secs).unwrap_or(i32::MAX)
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub session_id: String,
    pub turn_index: i32,
    pub question_type: QuestionType,
    pub question_text: String,
    /// Empty until the candidate submits.
    pub answer_text: String,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Open object: `questionId`, `answerDuration`, signal summaries, follow-up flag.
    pub metrics: Value,
}

impl Turn {
    pub fn has_answer(&self) -> bool {
        !self.answer_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub session_id: String,
    pub status: ReportStatus,
    pub total_score: Option<f64>,
    pub duration_sec: Option<i32>,
    pub model: Option<String>,
    pub prompt_version: Option<String>,
    /// Null while the report is pending.
    pub generated_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error_message: Option<String>,
}

impl Report {
    pub fn analyzing(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            status: ReportStatus::Analyzing,
            total_score: None,
            duration_sec: None,
            model: None,
            prompt_version: None,
            generated_at: None,
            result: None,
            error_message: None,
        }
    }

    /// A finished report that must not be regenerated by a retried trigger.
    pub fn is_settled(&self) -> bool {
        self.status == ReportStatus::Done && self.generated_at.is_some()
    }
}

/// A session loaded together with its ordered turns and optional report.
#[derive(Debug, Clone)]
pub struct SessionWithTurns {
    pub session: Session,
    pub turns: Vec<Turn>,
    pub report: Option<Report>,
}

impl SessionWithTurns {
    pub fn turn(&self, turn_index: i32) -> Option<&Turn> {
        self.turns.iter().find(|t| t.turn_index == turn_index)
    }

    pub fn answered_turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.has_answer())
    }
}
