//! Read-side folds over stored sessions and reports.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::policy::MAX_TURNS;
use crate::errors::AppError;
use crate::models::interview::{Report, ReportStatus, SessionStatus};
use crate::report::view::{self, ReportView};
use crate::store::{CompletedSession, OwnerScope, SessionStore};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

// ─── Shapes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    pub interview_id: String,
    pub title: Option<String>,
    pub interview_status: SessionStatus,
    /// `None` until the interview has been completed once.
    pub report: Option<ReportDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i32>,
    pub model: Option<String>,
    pub prompt_version: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub view: ReportView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListItem {
    pub interview_id: String,
    pub title: Option<String>,
    pub interview_status: SessionStatus,
    pub report_status: Option<ReportStatus>,
    pub total_score: Option<f64>,
    pub generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub number: i64,
    pub size: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageMeta {
    pub fn new(number: i64, size: i64, total_items: i64) -> Self {
        let total_pages = if size > 0 { (total_items + size - 1) / size } else { 0 };
        Self {
            number,
            size,
            total_items,
            total_pages,
            has_next: number < total_pages,
            has_prev: number > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    pub items: Vec<ReportListItem>,
    pub page: PageMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub id: String,
    pub score: f64,
    pub date: String,
    pub duration: String,
    pub question_progress: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub metrics: RecordMetrics,
}

/// Competency scores under the names the home screen uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetrics {
    pub logic: f64,
    pub clarity: f64,
    pub eye_contact: f64,
    pub voice: f64,
    pub star: f64,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub score: f64,
}

// ─── Queries ─────────────────────────────────────────────────────────────────

pub struct QueryProjections {
    store: Arc<dyn SessionStore>,
}

impl QueryProjections {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn get_report(
        &self,
        session_id: &str,
        caller: Option<&str>,
    ) -> Result<ReportEnvelope, AppError> {
        let data = self
            .store
            .load_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview not found: {session_id}")))?;
        if data.session.is_owned_by_other(caller) {
            return Err(AppError::Forbidden);
        }

        let report = data.report.as_ref().map(|report| ReportDetail {
            status: report.status,
            total_score: report.total_score,
            duration_sec: report.duration_sec,
            model: report.model.clone(),
            prompt_version: report.prompt_version.clone(),
            generated_at: report.generated_at,
            result: report.result.clone(),
            error_message: report.error_message.clone(),
            view: view::normalize(&data),
        });

        Ok(ReportEnvelope {
            interview_id: data.session.session_id.clone(),
            title: data.session.title.clone(),
            interview_status: data.session.status,
            report,
        })
    }

    /// `page` is 1-based. Out-of-range values are rejected rather than clamped.
    pub async fn list_reports(
        &self,
        owner: OwnerScope<'_>,
        page: Option<i64>,
        size: Option<i64>,
    ) -> Result<ReportPage, AppError> {
        let page = page.unwrap_or(1);
        let size = size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(AppError::Validation(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let offset = (page - 1)
            .checked_mul(size)
            .ok_or_else(|| AppError::Validation("page is out of range".to_string()))?;

        let (total, listings) = self.store.list_sessions(owner, offset, size).await?;

        let items = listings
            .into_iter()
            .map(|listing| {
                let report = listing.report.as_ref();
                ReportListItem {
                    interview_id: listing.session.session_id,
                    title: listing.session.title,
                    interview_status: listing.session.status,
                    report_status: report.map(|r| r.status),
                    total_score: report.and_then(score_of),
                    generated_at: report.and_then(|r| r.generated_at),
                    created_at: listing.session.started_at,
                }
            })
            .collect();

        Ok(ReportPage {
            items,
            page: PageMeta::new(page, size, total),
        })
    }

    /// Done reports, newest first.
    pub async fn records(&self, owner: OwnerScope<'_>) -> Result<Vec<InterviewRecord>, AppError> {
        let completed = self.store.completed_sessions(owner).await?;
        Ok(completed.iter().map(to_record).collect())
    }

    /// Done reports, oldest first.
    pub async fn score_trend(&self, owner: OwnerScope<'_>) -> Result<Vec<TrendPoint>, AppError> {
        let completed = self.store.completed_sessions(owner).await?;
        Ok(completed
            .iter()
            .rev()
            .map(|c| TrendPoint {
                date: point_date(c).format("%m/%d").to_string(),
                score: score_of(&c.report).unwrap_or(0.0),
            })
            .collect())
    }
}

// ─── Folds ───────────────────────────────────────────────────────────────────

/// The score column, else a score embedded in the stored result.
fn score_of(report: &Report) -> Option<f64> {
    report
        .total_score
        .filter(|s| s.is_finite())
        .or_else(|| {
            let result = view::as_object(report.result.as_ref());
            view::lenient_number(result.and_then(|r| r.get("totalScore")))
        })
}

fn point_date(completed: &CompletedSession) -> DateTime<Utc> {
    completed
        .report
        .generated_at
        .unwrap_or(completed.session.started_at)
}

fn to_record(completed: &CompletedSession) -> InterviewRecord {
    let report = &completed.report;
    let result = view::as_object(report.result.as_ref());
    let duration_sec = report
        .duration_sec
        .or_else(|| completed.session.elapsed_secs())
        .unwrap_or(0);

    InterviewRecord {
        id: completed.session.session_id.clone(),
        score: score_of(report).unwrap_or(0.0),
        date: point_date(completed).format("%Y-%m-%d").to_string(),
        duration: format_duration(duration_sec),
        question_progress: format!(
            "{}/{MAX_TURNS} questions answered",
            completed.answered_turns
        ),
        strengths: view::string_list(result.and_then(|r| r.get("strengths"))),
        improvements: view::string_list(result.and_then(|r| r.get("weaknesses"))),
        metrics: record_metrics(report.result.as_ref()),
    }
}

/// `"<m>m <ss>s"`
pub fn format_duration(duration_sec: i32) -> String {
    let secs = duration_sec.max(0);
    format!("{}m {:02}s", secs / 60, secs % 60)
}

fn record_metrics(result: Option<&Value>) -> RecordMetrics {
    let items = view::as_object(result)
        .and_then(|r| view::as_object(r.get("competencies")))
        .and_then(|c| c.get("items"))
        .and_then(Value::as_array);

    let mut scores: HashMap<&str, f64> = HashMap::new();
    for item in items.into_iter().flatten().filter_map(Value::as_object) {
        if let Some(key) = item.get("key").and_then(Value::as_str) {
            scores.insert(key, view::lenient_number(item.get("score")).unwrap_or(0.0));
        }
    }
    let score = |key: &str| scores.get(key).copied().unwrap_or(0.0);

    RecordMetrics {
        logic: score("LOGIC"),
        clarity: score("SPECIFICITY"),
        eye_contact: score("EYE_CONTACT"),
        voice: score("VOICE_TONE"),
        star: score("STAR_METHOD"),
        time: score("TIME_MANAGEMENT"),
    }
}
