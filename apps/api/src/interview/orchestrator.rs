//! Session/turn state machine.
//!
//! `IN_PROGRESS → ANALYZING → {DONE | FAILED}`, with `{DONE | FAILED} → ANALYZING`
//! on regeneration. Question generation happens before any write, and each
//! write is a single guarded store call, so a failed provider call or a
//! concurrent submission leaves nothing half-applied.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::metrics::{merge_metrics, SubmittedMetrics};
use super::policy::{
    default_title, next_followup_streak, next_question_type, remaining_followups, title_prefix,
    DEFAULT_TOTAL_LIMIT_SEC, DEFAULT_TURN_LIMIT_SEC, MAX_TURNS,
};
use crate::ai::{GeneratedQuestion, QuestionGenerator, QuestionRequest};
use crate::errors::AppError;
use crate::models::interview::{QuestionType, Session, SessionStatus, Topic, Turn};
use crate::report::ReportTrigger;
use crate::store::{AnsweredTurn, NextTurn, SessionStore, StoreError};

#[derive(Debug, Clone)]
pub struct StartInterview {
    pub topic: Topic,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartedInterview {
    pub session_id: String,
    pub topic: Topic,
    pub status: SessionStatus,
    pub turn_index: i32,
    pub first_question: GeneratedQuestion,
}

#[derive(Debug, Clone)]
pub struct TurnSubmission {
    pub turn_index: i32,
    pub answer_text: String,
    /// Carries the follow-up request for the next question.
    pub metrics: SubmittedMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestion {
    pub question_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    /// `None` once the interview is complete.
    pub next_turn_index: Option<i32>,
    pub status: SessionStatus,
    pub next_question: Option<NextQuestion>,
    pub consecutive_followup_count: i32,
    pub remaining_followup_count: i32,
}

pub struct InterviewOrchestrator {
    store: Arc<dyn SessionStore>,
    questions: Arc<dyn QuestionGenerator>,
    reports: Arc<dyn ReportTrigger>,
}

impl InterviewOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        questions: Arc<dyn QuestionGenerator>,
        reports: Arc<dyn ReportTrigger>,
    ) -> Self {
        Self {
            store,
            questions,
            reports,
        }
    }

    // ─── Start ───────────────────────────────────────────────────────────────

    pub async fn start(
        &self,
        request: StartInterview,
        owner: Option<&str>,
    ) -> Result<StartedInterview, AppError> {
        let topic = validate_topic(request.topic)?;
        info!(
            "Starting interview: owner={:?}, topic={}",
            owner, topic.main_topic_id
        );

        let first_question = self
            .questions
            .generate_question(&QuestionRequest {
                main_topic_id: topic.main_topic_id.clone(),
                sub_topic_ids: topic.sub_topic_ids.clone(),
                turn_index: 1,
                previous_questions: Vec::new(),
                is_followup: false,
                answer_text: None,
            })
            .await
            .map_err(|e| {
                error!("First question generation failed: {e}");
                AppError::from(e)
            })?;

        let started_at = Utc::now();
        let title = match request.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => {
                let today = started_at.date_naive();
                let existing = self.store.titles_with_prefix(&title_prefix(today)).await?;
                default_title(today, &existing)
            }
        };

        let session_id = format!("intv_{}", Uuid::new_v4().simple());
        let session = Session {
            session_id: session_id.clone(),
            owner_id: owner.map(str::to_string),
            title: Some(title),
            topic: topic.clone(),
            status: SessionStatus::InProgress,
            current_turn: 1,
            followup_streak: 0,
            turn_limit_sec: DEFAULT_TURN_LIMIT_SEC,
            total_limit_sec: DEFAULT_TOTAL_LIMIT_SEC,
            started_at,
            ended_at: None,
        };
        let first_turn = Turn {
            session_id: session_id.clone(),
            turn_index: 1,
            question_type: QuestionType::Base,
            question_text: first_question.text.clone(),
            answer_text: String::new(),
            submitted_at: None,
            metrics: json!({ "questionId": first_question.question_id }),
        };
        self.store.create_session(&session, &first_turn).await?;

        info!("Interview {session_id} started with question {}", first_question.question_id);
        Ok(StartedInterview {
            session_id,
            topic,
            status: SessionStatus::InProgress,
            turn_index: 1,
            first_question,
        })
    }

    // ─── Submit turn ─────────────────────────────────────────────────────────

    pub async fn submit_turn(
        &self,
        session_id: &str,
        caller: Option<&str>,
        submission: TurnSubmission,
    ) -> Result<TurnOutcome, AppError> {
        if !(1..=MAX_TURNS).contains(&submission.turn_index) {
            return Err(AppError::Validation(format!(
                "turnIndex must be between 1 and {MAX_TURNS}"
            )));
        }
        submission.metrics.validate().map_err(AppError::Validation)?;

        let data = self
            .store
            .load_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview not found: {session_id}")))?;
        let session = &data.session;

        if session.is_owned_by_other(caller) {
            return Err(AppError::Forbidden);
        }
        if session.status != SessionStatus::InProgress {
            return Err(AppError::InvalidState(format!(
                "Interview is not in progress. Current status: {}",
                session.status
            )));
        }
        if submission.turn_index != session.current_turn {
            return Err(AppError::SequenceMismatch {
                expected: session.current_turn,
                received: submission.turn_index,
            });
        }
        let current = data.turn(submission.turn_index).ok_or_else(|| {
            AppError::InvalidState(format!(
                "No question recorded for turn {} of {session_id}",
                submission.turn_index
            ))
        })?;

        info!(
            "Turn submitted: interview={session_id}, turn={}, caller={:?}",
            submission.turn_index, caller
        );

        let answered = AnsweredTurn {
            session_id: session_id.to_string(),
            turn_index: submission.turn_index,
            answer_text: submission.answer_text.clone(),
            submitted_at: Utc::now(),
            metrics: merge_metrics(&current.metrics, &submission.metrics),
        };

        if submission.turn_index >= MAX_TURNS {
            self.store
                .complete_session(&answered, Utc::now())
                .await
                .map_err(|e| sequence_conflict(e, submission.turn_index))?;
            info!("Interview {session_id} complete, analyzing");
            self.reports.dispatch(session_id);

            return Ok(TurnOutcome {
                session_id: session_id.to_string(),
                next_turn_index: None,
                status: SessionStatus::Analyzing,
                next_question: None,
                consecutive_followup_count: session.followup_streak,
                remaining_followup_count: remaining_followups(session.followup_streak),
            });
        }

        let requested_followup = submission.metrics.is_followup_question;
        let question_type = next_question_type(requested_followup, session.followup_streak);
        let is_followup = question_type == QuestionType::Followup;
        if requested_followup && !is_followup {
            info!(
                "Follow-up requested for {session_id} but streak is {}; issuing a base question",
                session.followup_streak
            );
        }

        let next_index = submission.turn_index + 1;
        let question = self
            .questions
            .generate_question(&QuestionRequest {
                main_topic_id: session.topic.main_topic_id.clone(),
                sub_topic_ids: session.topic.sub_topic_ids.clone(),
                turn_index: next_index,
                previous_questions: data.turns.iter().map(|t| t.question_text.clone()).collect(),
                is_followup,
                answer_text: is_followup.then(|| submission.answer_text.clone()),
            })
            .await
            .map_err(|e| {
                error!("Next question generation failed for {session_id}: {e}");
                AppError::from(e)
            })?;

        let followup_streak = next_followup_streak(question_type, session.followup_streak);
        let next = NextTurn {
            turn_index: next_index,
            question_type,
            question_text: question.text.clone(),
            metrics: json!({ "questionId": question.question_id }),
            followup_streak,
        };
        self.store
            .advance_turn(&answered, &next)
            .await
            .map_err(|e| sequence_conflict(e, submission.turn_index))?;

        info!(
            "Next question {} for {session_id}: turn={next_index}, type={}, streak={followup_streak}",
            question.question_id,
            question_type.as_str()
        );

        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            next_turn_index: Some(next_index),
            status: SessionStatus::InProgress,
            next_question: Some(NextQuestion {
                question_id: question.question_id,
                text: question.text,
                question_type,
            }),
            consecutive_followup_count: followup_streak,
            remaining_followup_count: remaining_followups(followup_streak),
        })
    }

    // ─── Regenerate ──────────────────────────────────────────────────────────

    /// Resets a finished report and queues a fresh generation run.
    pub async fn regenerate(&self, session_id: &str, caller: Option<&str>) -> Result<SessionStatus, AppError> {
        let data = self
            .store
            .load_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview not found: {session_id}")))?;

        if data.session.is_owned_by_other(caller) {
            return Err(AppError::Forbidden);
        }
        if !data.session.status.can_regenerate() {
            return Err(AppError::InvalidState(format!(
                "Report can only be regenerated for DONE or FAILED interviews. Current status: {}",
                data.session.status
            )));
        }
        if data.answered_turns().next().is_none() {
            return Err(AppError::InvalidState(
                "Interview has no submitted answers to evaluate".to_string(),
            ));
        }

        self.store
            .begin_regeneration(session_id)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(msg) => AppError::InvalidState(msg),
                other => other.into(),
            })?;

        info!("Report regeneration requested for {session_id}");
        self.reports.dispatch(session_id);
        Ok(SessionStatus::Analyzing)
    }
}

/// A guarded write lost a race with another submission for the same turn.
fn sequence_conflict(e: StoreError, received: i32) -> AppError {
    match e {
        StoreError::Conflict(msg) => {
            info!("Turn {received} lost a concurrent submission: {msg}");
            AppError::SequenceMismatch {
                expected: received + 1,
                received,
            }
        }
        other => other.into(),
    }
}

fn validate_topic(topic: Topic) -> Result<Topic, AppError> {
    let main_topic_id = topic.main_topic_id.trim().to_string();
    if main_topic_id.is_empty() {
        return Err(AppError::Validation("mainTopicId is required".to_string()));
    }
    let sub_topic_ids: Vec<String> = topic
        .sub_topic_ids
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if sub_topic_ids.is_empty() {
        return Err(AppError::Validation(
            "At least one subTopicId is required".to_string(),
        ));
    }
    Ok(Topic {
        main_topic_id,
        sub_topic_ids,
    })
}
