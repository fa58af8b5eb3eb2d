//! Persistence boundary for the session aggregate (session, turns, report).
//!
//! Each method that touches more than one record is a single unit of work:
//! implementations run it in one transaction so session state and turn state
//! land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::interview::{QuestionType, Report, Session, SessionWithTurns, Turn, UnknownVariant};

pub mod memory;
pub mod postgres;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {0} not found")]
    NotFound(String),

    /// A guarded write found the session in an unexpected state.
    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<UnknownVariant> for StoreError {
    fn from(e: UnknownVariant) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// The answer being recorded onto the session's current turn.
#[derive(Debug, Clone)]
pub struct AnsweredTurn {
    pub session_id: String,
    pub turn_index: i32,
    pub answer_text: String,
    pub submitted_at: DateTime<Utc>,
    /// Full metrics object (existing keys already merged).
    pub metrics: Value,
}

/// The question written at `turn_index` together with the session's new streak.
#[derive(Debug, Clone)]
pub struct NextTurn {
    pub turn_index: i32,
    pub question_type: QuestionType,
    pub question_text: String,
    pub metrics: Value,
    pub followup_streak: i32,
}

#[derive(Debug, Clone)]
pub struct SessionListing {
    pub session: Session,
    pub report: Option<Report>,
}

/// A session whose report reached `done`.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub session: Session,
    pub report: Report,
    pub answered_turns: usize,
}

/// Owner filter for list queries: `Some(owner)` matches that owner only,
/// `None` matches anonymous sessions only.
pub type OwnerScope<'a> = Option<&'a str>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the session and its first turn atomically.
    async fn create_session(&self, session: &Session, first_turn: &Turn) -> Result<(), StoreError>;

    /// Loads a session with turns ordered by index and its report, if any.
    async fn load_session(&self, session_id: &str) -> Result<Option<SessionWithTurns>, StoreError>;

    /// Records the answer, advances `current_turn` to `next.turn_index`, sets the
    /// follow-up streak and upserts the next turn.
    ///
    /// Guarded: fails with `Conflict` unless the session is in progress and its
    /// `current_turn` equals `answered.turn_index`.
    async fn advance_turn(&self, answered: &AnsweredTurn, next: &NextTurn) -> Result<(), StoreError>;

    /// Records the final answer, moves the session to analyzing, stamps
    /// `ended_at` and resets the report to analyzing. Same guard as `advance_turn`.
    async fn complete_session(
        &self,
        answered: &AnsweredTurn,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Moves a done/failed session back to analyzing and resets its report.
    /// Fails with `Conflict` for any other status.
    async fn begin_regeneration(&self, session_id: &str) -> Result<(), StoreError>;

    async fn load_report(&self, session_id: &str) -> Result<Option<Report>, StoreError>;

    /// Persists a terminal report and sets the session status to match
    /// (`done` → DONE, `failed` → FAILED).
    async fn finish_report(&self, report: &Report) -> Result<(), StoreError>;

    async fn titles_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Newest first. Returns the total matching count and the requested page.
    async fn list_sessions(
        &self,
        owner: OwnerScope<'_>,
        offset: i64,
        limit: i64,
    ) -> Result<(i64, Vec<SessionListing>), StoreError>;

    /// Sessions with a `done` report, newest first.
    async fn completed_sessions(&self, owner: OwnerScope<'_>) -> Result<Vec<CompletedSession>, StoreError>;

    /// Session ids whose report is analyzing with no `generated_at`, oldest first.
    async fn pending_reports(&self, limit: i64) -> Result<Vec<String>, StoreError>;
}
