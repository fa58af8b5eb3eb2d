//! Question and report generation on top of the configured `CompletionBackend`.
//!
//! The orchestrator and the report pipeline depend only on the
//! `QuestionGenerator` / `ReportGenerator` traits; `AiService` is the
//! production implementation of both.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{CompletionBackend, CompletionRequest, LlmError};

pub mod prompts;
pub mod question;
#[cfg(test)]
pub mod testing;

const QUESTION_MAX_TOKENS: u32 = 500;
const QUESTION_TEMPERATURE: f32 = 0.7;
const REPORT_MAX_TOKENS: u32 = 1500;
const REPORT_TEMPERATURE: f32 = 0.2;

/// Provider failures, classified by who has to act on them.
#[derive(Debug, Error)]
pub enum AiError {
    /// The provider account is out of quota; an operator must act.
    #[error("AI provider quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Transient throttling; the caller can retry shortly.
    #[error("AI provider rate limited: {0}")]
    RateLimited(String),

    #[error("AI provider error: {0}")]
    Provider(String),
}

impl From<LlmError> for AiError {
    fn from(e: LlmError) -> Self {
        if e.is_insufficient_quota() {
            AiError::QuotaExhausted(e.to_string())
        } else if e.is_rate_limited() {
            AiError::RateLimited(e.to_string())
        } else {
            AiError::Provider(e.to_string())
        }
    }
}

/// Input for one question. `answer_text` is only set for follow-ups.
#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub main_topic_id: String,
    pub sub_topic_ids: Vec<String>,
    pub turn_index: i32,
    pub previous_questions: Vec<String>,
    pub is_followup: bool,
    pub answer_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question_id: String,
    pub text: String,
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion, AiError>;
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Raw model reply for an evaluation prompt. Not guaranteed to be valid JSON.
    async fn generate_report_text(&self, prompt: &str) -> Result<String, AiError>;

    /// Model identifier stored on the report.
    fn model(&self) -> &str;
}

#[derive(Clone)]
pub struct AiService {
    backend: Arc<dyn CompletionBackend>,
}

impl AiService {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl QuestionGenerator for AiService {
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion, AiError> {
        let prompt = prompts::build_question_prompt(request);
        info!(
            "Requesting question: topic={}, sub_topics={}, turn={}, followup={}",
            request.main_topic_id,
            request.sub_topic_ids.join(", "),
            request.turn_index,
            request.is_followup
        );

        let reply = self
            .backend
            .complete(&CompletionRequest {
                system: prompts::QUESTION_SYSTEM,
                prompt: &prompt,
                max_tokens: QUESTION_MAX_TOKENS,
                temperature: Some(QUESTION_TEMPERATURE),
            })
            .await
            .map_err(|e| {
                error!("Question generation failed: {e}");
                AiError::from(e)
            })?;

        if reply.trim().is_empty() {
            return Err(AiError::Provider("AI question response was empty".to_string()));
        }

        let question_id = format!("q_{}_{}", Utc::now().timestamp_millis(), request.turn_index);
        info!("Generated question {question_id}");

        Ok(GeneratedQuestion {
            question_id,
            text: question::extract_single_question(&reply),
        })
    }
}

#[async_trait]
impl ReportGenerator for AiService {
    async fn generate_report_text(&self, prompt: &str) -> Result<String, AiError> {
        let reply = self
            .backend
            .complete(&CompletionRequest {
                system: JSON_ONLY_SYSTEM,
                prompt,
                max_tokens: REPORT_MAX_TOKENS,
                temperature: Some(REPORT_TEMPERATURE),
            })
            .await?;

        if reply.trim().is_empty() {
            return Err(AiError::Provider("AI report response was empty".to_string()));
        }
        Ok(reply)
    }

    fn model(&self) -> &str {
        self.backend.model()
    }
}
