//! Postgres-backed `SessionStore`.
//!
//! Guarded writes lock the session row with `SELECT … FOR UPDATE` inside a
//! transaction, re-check status and turn, then apply every change before commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

use super::{
    AnsweredTurn, CompletedSession, NextTurn, OwnerScope, SessionListing, SessionStore, StoreError,
};
use crate::models::interview::{
    Report, ReportStatus, Session, SessionStatus, SessionWithTurns, Topic, Turn,
};

const SESSION_COLUMNS: &str = "session_id, owner_id, title, topic, status, current_turn, \
    followup_streak, turn_limit_sec, total_limit_sec, started_at, ended_at";

const TURN_COLUMNS: &str =
    "session_id, turn_index, question_type, question_text, answer_text, submitted_at, metrics";

const REPORT_COLUMNS: &str = "session_id, status, total_score, duration_sec, model, \
    prompt_version, generated_at, result, error_message";

// ────────────────────────────────────────────────────────────────────────────
// Row types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    owner_id: Option<String>,
    title: Option<String>,
    topic: Json<Topic>,
    status: String,
    current_turn: i32,
    followup_streak: i32,
    turn_limit_sec: i32,
    total_limit_sec: i32,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            status: row.status.parse()?,
            session_id: row.session_id,
            owner_id: row.owner_id,
            title: row.title,
            topic: row.topic.0,
            current_turn: row.current_turn,
            followup_streak: row.followup_streak,
            turn_limit_sec: row.turn_limit_sec,
            total_limit_sec: row.total_limit_sec,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TurnRow {
    session_id: String,
    turn_index: i32,
    question_type: String,
    question_text: String,
    answer_text: String,
    submitted_at: Option<DateTime<Utc>>,
    metrics: Value,
}

impl TryFrom<TurnRow> for Turn {
    type Error = StoreError;

    fn try_from(row: TurnRow) -> Result<Self, Self::Error> {
        Ok(Turn {
            question_type: row.question_type.parse()?,
            session_id: row.session_id,
            turn_index: row.turn_index,
            question_text: row.question_text,
            answer_text: row.answer_text,
            submitted_at: row.submitted_at,
            metrics: row.metrics,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReportRow {
    session_id: String,
    status: String,
    total_score: Option<f64>,
    duration_sec: Option<i32>,
    model: Option<String>,
    prompt_version: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    result: Option<Value>,
    error_message: Option<String>,
}

impl TryFrom<ReportRow> for Report {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(Report {
            status: row.status.parse()?,
            session_id: row.session_id,
            total_score: row.total_score,
            duration_sec: row.duration_sec,
            model: row.model,
            prompt_version: row.prompt_version,
            generated_at: row.generated_at,
            result: row.result,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, FromRow)]
struct CompletedRow {
    #[sqlx(flatten)]
    session: SessionRow,
    answered_turns: i64,
}

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn reports_for(&self, session_ids: &[String]) -> Result<Vec<Report>, StoreError> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM interview_reports WHERE session_id = ANY($1)"
        ))
        .bind(session_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Report::try_from).collect()
    }
}

/// Locks the session row and checks it is in progress at `turn_index`.
async fn lock_current_turn(
    tx: &mut Transaction<'_, Postgres>,
    session_id: &str,
    turn_index: i32,
) -> Result<(), StoreError> {
    let row: Option<(String, i32)> = sqlx::query_as(
        "SELECT status, current_turn FROM interview_sessions WHERE session_id = $1 FOR UPDATE",
    )
    .bind(session_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (status, current_turn) = row.ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
    let status: SessionStatus = status.parse()?;
    if status != SessionStatus::InProgress || current_turn != turn_index {
        return Err(StoreError::Conflict(format!(
            "session {session_id} is {status} at turn {current_turn}, cannot record turn {turn_index}"
        )));
    }
    Ok(())
}

async fn record_answer(
    tx: &mut Transaction<'_, Postgres>,
    answered: &AnsweredTurn,
) -> Result<(), StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE interview_turns
        SET answer_text = $3, submitted_at = $4, metrics = $5
        WHERE session_id = $1 AND turn_index = $2
        "#,
    )
    .bind(&answered.session_id)
    .bind(answered.turn_index)
    .bind(&answered.answer_text)
    .bind(answered.submitted_at)
    .bind(&answered.metrics)
    .execute(&mut **tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "session {} has no turn {}",
            answered.session_id, answered.turn_index
        )));
    }
    Ok(())
}

async fn reset_report(tx: &mut Transaction<'_, Postgres>, session_id: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO interview_reports (session_id, status)
        VALUES ($1, 'analyzing')
        ON CONFLICT (session_id) DO UPDATE
        SET status = 'analyzing', generated_at = NULL, result = NULL,
            error_message = NULL, updated_at = now()
        "#,
    )
    .bind(session_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: &Session, first_turn: &Turn) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO interview_sessions
                (session_id, owner_id, title, topic, status, current_turn, followup_streak,
                 turn_limit_sec, total_limit_sec, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.owner_id)
        .bind(&session.title)
        .bind(Json(&session.topic))
        .bind(session.status.as_str())
        .bind(session.current_turn)
        .bind(session.followup_streak)
        .bind(session.turn_limit_sec)
        .bind(session.total_limit_sec)
        .bind(session.started_at)
        .bind(session.ended_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO interview_turns
                (session_id, turn_index, question_type, question_text, answer_text, metrics)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&first_turn.session_id)
        .bind(first_turn.turn_index)
        .bind(first_turn.question_type.as_str())
        .bind(&first_turn.question_text)
        .bind(&first_turn.answer_text)
        .bind(&first_turn.metrics)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Created session {}", session.session_id);
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionWithTurns>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM interview_sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let turns = sqlx::query_as::<_, TurnRow>(&format!(
            "SELECT {TURN_COLUMNS} FROM interview_turns WHERE session_id = $1 ORDER BY turn_index"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Turn::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let report = self.load_report(session_id).await?;

        Ok(Some(SessionWithTurns {
            session: Session::try_from(row)?,
            turns,
            report,
        }))
    }

    async fn advance_turn(&self, answered: &AnsweredTurn, next: &NextTurn) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_current_turn(&mut tx, &answered.session_id, answered.turn_index).await?;
        record_answer(&mut tx, answered).await?;

        sqlx::query(
            r#"
            UPDATE interview_sessions
            SET current_turn = $2, followup_streak = $3, updated_at = now()
            WHERE session_id = $1
            "#,
        )
        .bind(&answered.session_id)
        .bind(next.turn_index)
        .bind(next.followup_streak)
        .execute(&mut *tx)
        .await?;

        // Upsert: a retried request may find a placeholder already written at this index.
        sqlx::query(
            r#"
            INSERT INTO interview_turns
                (session_id, turn_index, question_type, question_text, answer_text, metrics)
            VALUES ($1, $2, $3, $4, '', $5)
            ON CONFLICT (session_id, turn_index) DO UPDATE
            SET question_type = EXCLUDED.question_type,
                question_text = EXCLUDED.question_text,
                metrics = EXCLUDED.metrics
            "#,
        )
        .bind(&answered.session_id)
        .bind(next.turn_index)
        .bind(next.question_type.as_str())
        .bind(&next.question_text)
        .bind(&next.metrics)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn complete_session(
        &self,
        answered: &AnsweredTurn,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_current_turn(&mut tx, &answered.session_id, answered.turn_index).await?;
        record_answer(&mut tx, answered).await?;

        sqlx::query(
            r#"
            UPDATE interview_sessions
            SET status = 'analyzing', ended_at = $2, updated_at = now()
            WHERE session_id = $1
            "#,
        )
        .bind(&answered.session_id)
        .bind(ended_at)
        .execute(&mut *tx)
        .await?;

        reset_report(&mut tx, &answered.session_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn begin_regeneration(&self, session_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM interview_sessions WHERE session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;
        let status: SessionStatus = status
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?
            .parse()?;
        if !status.can_regenerate() {
            return Err(StoreError::Conflict(format!("session {session_id} is {status}")));
        }

        sqlx::query(
            "UPDATE interview_sessions SET status = 'analyzing', updated_at = now() WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        reset_report(&mut tx, session_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_report(&self, session_id: &str) -> Result<Option<Report>, StoreError> {
        sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM interview_reports WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Report::try_from)
        .transpose()
    }

    async fn finish_report(&self, report: &Report) -> Result<(), StoreError> {
        let session_status = match report.status {
            ReportStatus::Done => SessionStatus::Done,
            ReportStatus::Failed => SessionStatus::Failed,
            ReportStatus::Analyzing => {
                return Err(StoreError::Conflict(
                    "finish_report requires a terminal report".to_string(),
                ))
            }
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO interview_reports
                (session_id, status, total_score, duration_sec, model, prompt_version,
                 generated_at, result, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (session_id) DO UPDATE
            SET status = EXCLUDED.status,
                total_score = EXCLUDED.total_score,
                duration_sec = EXCLUDED.duration_sec,
                model = EXCLUDED.model,
                prompt_version = EXCLUDED.prompt_version,
                generated_at = EXCLUDED.generated_at,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                updated_at = now()
            "#,
        )
        .bind(&report.session_id)
        .bind(report.status.as_str())
        .bind(report.total_score)
        .bind(report.duration_sec)
        .bind(&report.model)
        .bind(&report.prompt_version)
        .bind(report.generated_at)
        .bind(&report.result)
        .bind(&report.error_message)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE interview_sessions SET status = $2, updated_at = now() WHERE session_id = $1",
        )
        .bind(&report.session_id)
        .bind(session_status.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(report.session_id.clone()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn titles_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let titles: Vec<String> = sqlx::query_scalar(
            "SELECT title FROM interview_sessions WHERE title IS NOT NULL AND starts_with(title, $1)",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(titles)
    }

    async fn list_sessions(
        &self,
        owner: OwnerScope<'_>,
        offset: i64,
        limit: i64,
    ) -> Result<(i64, Vec<SessionListing>), StoreError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM interview_sessions WHERE owner_id IS NOT DISTINCT FROM $1",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        let sessions = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM interview_sessions \
             WHERE owner_id IS NOT DISTINCT FROM $1 \
             ORDER BY created_at DESC, session_id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(owner)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Session::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<String> = sessions.iter().map(|s| s.session_id.clone()).collect();
        let mut reports = self.reports_for(&ids).await?;

        let items = sessions
            .into_iter()
            .map(|session| {
                let report = reports
                    .iter()
                    .position(|r| r.session_id == session.session_id)
                    .map(|i| reports.swap_remove(i));
                SessionListing { session, report }
            })
            .collect();

        Ok((total, items))
    }

    async fn completed_sessions(&self, owner: OwnerScope<'_>) -> Result<Vec<CompletedSession>, StoreError> {
        let rows = sqlx::query_as::<_, CompletedRow>(
            r#"
            SELECT s.session_id, s.owner_id, s.title, s.topic, s.status, s.current_turn,
                   s.followup_streak, s.turn_limit_sec, s.total_limit_sec, s.started_at, s.ended_at,
                   (SELECT COUNT(*) FROM interview_turns t
                     WHERE t.session_id = s.session_id AND btrim(t.answer_text) <> '') AS answered_turns
            FROM interview_sessions s
            JOIN interview_reports r ON r.session_id = s.session_id
            WHERE r.status = 'done' AND s.owner_id IS NOT DISTINCT FROM $1
            ORDER BY s.created_at DESC, s.session_id DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.iter().map(|r| r.session.session_id.clone()).collect();
        let mut reports = self.reports_for(&ids).await?;

        let mut completed = Vec::with_capacity(rows.len());
        for row in rows {
            let session = Session::try_from(row.session)?;
            let Some(pos) = reports.iter().position(|r| r.session_id == session.session_id) else {
                continue;
            };
            completed.push(CompletedSession {
                report: reports.swap_remove(pos),
                session,
                answered_turns: usize::try_from(row.answered_turns).unwrap_or(0),
            });
        }
        Ok(completed)
    }

    async fn pending_reports(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT session_id FROM interview_reports
            WHERE status = 'analyzing' AND generated_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
