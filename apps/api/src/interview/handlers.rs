//! Axum route handlers for the Interview API.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::request::Parts,
    Json,
};
use serde::{Deserialize, Serialize};

use super::metrics::{FaceMetrics, SubmittedMetrics, VoiceMetrics};
use super::orchestrator::{NextQuestion, StartInterview, TurnSubmission};
use super::projections::{InterviewRecord, ReportEnvelope, ReportPage, TrendPoint};
use crate::ai::GeneratedQuestion;
use crate::errors::AppError;
use crate::models::interview::{SessionStatus, Topic};
use crate::routes::middleware::{ApiResponse, RequestId};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller, from the `x-user-id` header. `None` is anonymous.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<String>);

impl Caller {
    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Caller(id))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    #[serde(default)]
    pub main_topic_id: String,
    #[serde(default)]
    pub sub_topic_ids: Vec<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopicLabel {
    pub id: String,
    pub label: String,
}

impl TopicLabel {
    fn of(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopicsEcho {
    pub main: TopicLabel,
    pub subs: Vec<TopicLabel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewResponse {
    pub interview_id: String,
    pub topics: TopicsEcho,
    pub status: SessionStatus,
    pub turn_index: i32,
    pub first_question: GeneratedQuestion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTurnRequest {
    pub turn_index: i32,
    pub answer_text: String,
    pub answer_duration: f64,
    pub face_metrics: Option<FaceMetrics>,
    pub voice_metrics: Option<VoiceMetrics>,
    #[serde(default)]
    pub is_followup_question: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTurnResponse {
    pub interview_id: String,
    pub next_turn_index: Option<i32>,
    pub status: SessionStatus,
    pub next_question: Option<NextQuestion>,
    pub message: &'static str,
    pub consecutive_followup_count: i32,
    pub remaining_followup_count: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateResponse {
    pub interview_id: String,
    pub status: SessionStatus,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::Validation(e.body_text()))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interviews
///
/// Starts an interview and returns its first question.
pub async fn handle_create_interview(
    State(state): State<AppState>,
    request_id: RequestId,
    caller: Caller,
    payload: Result<Json<CreateInterviewRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CreateInterviewResponse>>, AppError> {
    let request = json_body(payload)?;
    let started = state
        .orchestrator
        .start(
            StartInterview {
                topic: Topic {
                    main_topic_id: request.main_topic_id,
                    sub_topic_ids: request.sub_topic_ids,
                },
                title: request.title,
            },
            caller.id(),
        )
        .await?;

    let topics = TopicsEcho {
        main: TopicLabel::of(&started.topic.main_topic_id),
        subs: started.topic.sub_topic_ids.iter().map(|id| TopicLabel::of(id)).collect(),
    };
    Ok(ApiResponse::ok(
        request_id,
        CreateInterviewResponse {
            interview_id: started.session_id,
            topics,
            status: started.status,
            turn_index: started.turn_index,
            first_question: started.first_question,
        },
    ))
}

/// POST /api/v1/interviews/:id/turns
///
/// Records the answer to the current turn and returns the next question,
/// or completes the interview on the final turn.
pub async fn handle_submit_turn(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
    request_id: RequestId,
    caller: Caller,
    payload: Result<Json<SubmitTurnRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SubmitTurnResponse>>, AppError> {
    let request = json_body(payload)?;
    let outcome = state
        .orchestrator
        .submit_turn(
            &interview_id,
            caller.id(),
            TurnSubmission {
                turn_index: request.turn_index,
                answer_text: request.answer_text,
                metrics: SubmittedMetrics {
                    answer_duration: request.answer_duration,
                    face_metrics: request.face_metrics,
                    voice_metrics: request.voice_metrics,
                    is_followup_question: request.is_followup_question,
                },
            },
        )
        .await?;

    let message = if outcome.next_question.is_some() {
        "Answer submitted"
    } else {
        "Interview complete. The report is being analyzed."
    };
    Ok(ApiResponse::ok(
        request_id,
        SubmitTurnResponse {
            interview_id: outcome.session_id,
            next_turn_index: outcome.next_turn_index,
            status: outcome.status,
            next_question: outcome.next_question,
            message,
            consecutive_followup_count: outcome.consecutive_followup_count,
            remaining_followup_count: outcome.remaining_followup_count,
        },
    ))
}

/// GET /api/v1/interviews/:id/report
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
    request_id: RequestId,
    caller: Caller,
) -> Result<Json<ApiResponse<ReportEnvelope>>, AppError> {
    let envelope = state.projections.get_report(&interview_id, caller.id()).await?;
    Ok(ApiResponse::ok(request_id, envelope))
}

/// POST /api/v1/interviews/:id/report/regenerate
pub async fn handle_regenerate_report(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
    request_id: RequestId,
    caller: Caller,
) -> Result<Json<ApiResponse<RegenerateResponse>>, AppError> {
    let status = state.orchestrator.regenerate(&interview_id, caller.id()).await?;
    Ok(ApiResponse::ok(
        request_id,
        RegenerateResponse {
            interview_id,
            status,
            message: "Report regeneration started",
        },
    ))
}

/// GET /api/v1/interviews/reports?page=&size=
pub async fn handle_list_reports(
    State(state): State<AppState>,
    request_id: RequestId,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<ReportPage>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let page = state
        .projections
        .list_reports(caller.id(), query.page, query.size)
        .await?;
    Ok(ApiResponse::ok(request_id, page))
}

/// GET /api/v1/interview/records
pub async fn handle_records(
    State(state): State<AppState>,
    request_id: RequestId,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<InterviewRecord>>>, AppError> {
    let records = state.projections.records(caller.id()).await?;
    Ok(ApiResponse::ok(request_id, records))
}

/// GET /api/v1/interview/score-trend
pub async fn handle_score_trend(
    State(state): State<AppState>,
    request_id: RequestId,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<TrendPoint>>>, AppError> {
    let trend = state.projections.score_trend(caller.id()).await?;
    Ok(ApiResponse::ok(request_id, trend))
}
