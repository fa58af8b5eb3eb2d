//! In-process `SessionStore` with the same guards as the Postgres store.
//! Backs the unit tests and local runs without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    AnsweredTurn, CompletedSession, NextTurn, OwnerScope, SessionListing, SessionStore, StoreError,
};
use crate::models::interview::{
    Report, ReportStatus, Session, SessionStatus, SessionWithTurns, Turn,
};

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionWithTurns>,
    /// Creation order; ties on `started_at` resolve by position here.
    order: Vec<String>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    state: Mutex<State>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-write; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overwrites a session's status directly. Test seeding only.
    #[cfg(test)]
    pub fn set_status(&self, session_id: &str, status: SessionStatus) {
        let mut state = self.lock();
        if let Some(entry) = state.sessions.get_mut(session_id) {
            entry.session.status = status;
        }
    }
}

fn owner_matches(session: &Session, owner: OwnerScope<'_>) -> bool {
    session.owner_id.as_deref() == owner
}

fn guard_current_turn(entry: &SessionWithTurns, turn_index: i32) -> Result<(), StoreError> {
    let session = &entry.session;
    if session.status != SessionStatus::InProgress || session.current_turn != turn_index {
        return Err(StoreError::Conflict(format!(
            "session {} is {} at turn {}, cannot record turn {}",
            session.session_id, session.status, session.current_turn, turn_index
        )));
    }
    if entry.turn(turn_index).is_none() {
        return Err(StoreError::Conflict(format!(
            "session {} has no turn {}",
            session.session_id, turn_index
        )));
    }
    Ok(())
}

fn record_answer(entry: &mut SessionWithTurns, answered: &AnsweredTurn) {
    if let Some(turn) = entry
        .turns
        .iter_mut()
        .find(|t| t.turn_index == answered.turn_index)
    {
        turn.answer_text = answered.answer_text.clone();
        turn.submitted_at = Some(answered.submitted_at);
        turn.metrics = answered.metrics.clone();
    }
}

fn reset_report(entry: &mut SessionWithTurns) {
    let session_id = entry.session.session_id.clone();
    match entry.report.as_mut() {
        Some(report) => {
            report.status = ReportStatus::Analyzing;
            report.generated_at = None;
            report.result = None;
            report.error_message = None;
        }
        None => entry.report = Some(Report::analyzing(&session_id)),
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &Session, first_turn: &Turn) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.session_id
            )));
        }
        state.order.push(session.session_id.clone());
        state.sessions.insert(
            session.session_id.clone(),
            SessionWithTurns {
                session: session.clone(),
                turns: vec![first_turn.clone()],
                report: None,
            },
        );
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionWithTurns>, StoreError> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    async fn advance_turn(&self, answered: &AnsweredTurn, next: &NextTurn) -> Result<(), StoreError> {
        let mut state = self.lock();
        let entry = state
            .sessions
            .get_mut(&answered.session_id)
            .ok_or_else(|| StoreError::NotFound(answered.session_id.clone()))?;
        guard_current_turn(entry, answered.turn_index)?;

        record_answer(entry, answered);
        entry.session.current_turn = next.turn_index;
        entry.session.followup_streak = next.followup_streak;

        match entry.turns.iter_mut().find(|t| t.turn_index == next.turn_index) {
            Some(existing) => {
                existing.question_type = next.question_type;
                existing.question_text = next.question_text.clone();
                existing.metrics = next.metrics.clone();
            }
            None => {
                entry.turns.push(Turn {
                    session_id: answered.session_id.clone(),
                    turn_index: next.turn_index,
                    question_type: next.question_type,
                    question_text: next.question_text.clone(),
                    answer_text: String::new(),
                    submitted_at: None,
                    metrics: next.metrics.clone(),
                });
                entry.turns.sort_by_key(|t| t.turn_index);
            }
        }
        Ok(())
    }

    async fn complete_session(
        &self,
        answered: &AnsweredTurn,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let entry = state
            .sessions
            .get_mut(&answered.session_id)
            .ok_or_else(|| StoreError::NotFound(answered.session_id.clone()))?;
        guard_current_turn(entry, answered.turn_index)?;

        record_answer(entry, answered);
        entry.session.status = SessionStatus::Analyzing;
        entry.session.ended_at = Some(ended_at);
        reset_report(entry);
        Ok(())
    }

    async fn begin_regeneration(&self, session_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let entry = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if !entry.session.status.can_regenerate() {
            return Err(StoreError::Conflict(format!(
                "session {session_id} is {}",
                entry.session.status
            )));
        }
        entry.session.status = SessionStatus::Analyzing;
        reset_report(entry);
        Ok(())
    }

    async fn load_report(&self, session_id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .get(session_id)
            .and_then(|entry| entry.report.clone()))
    }

    async fn finish_report(&self, report: &Report) -> Result<(), StoreError> {
        let mut state = self.lock();
        let entry = state
            .sessions
            .get_mut(&report.session_id)
            .ok_or_else(|| StoreError::NotFound(report.session_id.clone()))?;
        entry.session.status = match report.status {
            ReportStatus::Done => SessionStatus::Done,
            ReportStatus::Failed => SessionStatus::Failed,
            ReportStatus::Analyzing => {
                return Err(StoreError::Conflict(
                    "finish_report requires a terminal report".to_string(),
                ))
            }
        };
        entry.report = Some(report.clone());
        Ok(())
    }

    async fn titles_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter_map(|entry| entry.session.title.clone())
            .filter(|title| title.starts_with(prefix))
            .collect())
    }

    async fn list_sessions(
        &self,
        owner: OwnerScope<'_>,
        offset: i64,
        limit: i64,
    ) -> Result<(i64, Vec<SessionListing>), StoreError> {
        let state = self.lock();
        let matching: Vec<&SessionWithTurns> = state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.sessions.get(id))
            .filter(|entry| owner_matches(&entry.session, owner))
            .collect();

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|entry| SessionListing {
                session: entry.session.clone(),
                report: entry.report.clone(),
            })
            .collect();
        Ok((total, items))
    }

    async fn completed_sessions(&self, owner: OwnerScope<'_>) -> Result<Vec<CompletedSession>, StoreError> {
        let state = self.lock();
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.sessions.get(id))
            .filter(|entry| owner_matches(&entry.session, owner))
            .filter_map(|entry| {
                let report = entry.report.as_ref()?;
                (report.status == ReportStatus::Done).then(|| CompletedSession {
                    session: entry.session.clone(),
                    report: report.clone(),
                    answered_turns: entry.answered_turns().count(),
                })
            })
            .collect())
    }

    async fn pending_reports(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        Ok(state
            .order
            .iter()
            .filter(|id| {
                state
                    .sessions
                    .get(*id)
                    .and_then(|entry| entry.report.as_ref())
                    .map(|r| r.status == ReportStatus::Analyzing && r.generated_at.is_none())
                    .unwrap_or(false)
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
