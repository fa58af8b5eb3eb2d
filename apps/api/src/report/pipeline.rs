use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use super::parser::{parse_report_reply, ParsedReport};
use super::prompts::{build_report_prompt, PROMPT_VERSION};
use crate::ai::ReportGenerator;
use crate::models::interview::{Report, ReportStatus};
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// A settled report already existed; nothing was called or written.
    AlreadyDone,
    Done { degraded: bool },
    Failed,
    /// The session disappeared between dispatch and generation.
    Missing,
}

/// Generates, parses and persists the evaluation report of one session.
pub struct ReportPipeline {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn ReportGenerator>,
}

impl ReportPipeline {
    pub fn new(store: Arc<dyn SessionStore>, generator: Arc<dyn ReportGenerator>) -> Self {
        Self { store, generator }
    }

    /// Runs one generation attempt. Provider failures end in a `failed` report;
    /// only storage failures are returned as errors.
    pub async fn generate(&self, session_id: &str) -> Result<GenerateOutcome, StoreError> {
        if let Some(existing) = self.store.load_report(session_id).await? {
            if existing.is_settled() {
                info!("Report for {session_id} already generated, skipping");
                return Ok(GenerateOutcome::AlreadyDone);
            }
        }

        let Some(data) = self.store.load_session(session_id).await? else {
            warn!("Report requested for unknown session {session_id}");
            return Ok(GenerateOutcome::Missing);
        };

        let prompt = build_report_prompt(&data);
        let duration_sec = data.session.elapsed_secs();
        let model = self.generator.model().to_string();

        let mut report = Report {
            duration_sec,
            model: Some(model),
            prompt_version: Some(PROMPT_VERSION.to_string()),
            generated_at: Some(Utc::now()),
            ..Report::analyzing(session_id)
        };

        let outcome = match self.generator.generate_report_text(&prompt).await {
            Ok(raw) => {
                let parsed = parse_report_reply(&raw);
                let degraded = parsed == ParsedReport::Degraded;
                if degraded {
                    warn!(
                        "Report reply for {session_id} is not JSON, storing raw text ({} chars)",
                        raw.len()
                    );
                }
                let result = parsed.into_result(&raw);

                report.status = ReportStatus::Done;
                report.total_score = result.get("totalScore").and_then(Value::as_f64);
                report.generated_at = Some(Utc::now());
                report.result = Some(result);
                GenerateOutcome::Done { degraded }
            }
            Err(e) => {
                error!("Report generation failed for {session_id}: {e}");
                report.status = ReportStatus::Failed;
                report.error_message = Some(e.to_string());
                GenerateOutcome::Failed
            }
        };

        self.store.finish_report(&report).await?;
        info!(
            "Report for {session_id} finished: status={}, score={:?}",
            report.status.as_str(),
            report.total_score
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ai::testing::{ScriptedReports, SAMPLE_REPORT};
    use crate::ai::AiError;
    use crate::models::interview::{QuestionType, Session, SessionStatus, Topic, Turn};
    use crate::store::{AnsweredTurn, InMemorySessionStore};

    async fn completed_session(store: &InMemorySessionStore, id: &str) {
        let started_at = Utc::now() - chrono::Duration::seconds(125);
        let session = Session {
            session_id: id.to_string(),
            owner_id: None,
            title: Some("2026-10-18 (01)".to_string()),
            topic: Topic {
                main_topic_id: "backend".to_string(),
                sub_topic_ids: vec!["nestjs".to_string()],
            },
            status: SessionStatus::InProgress,
            current_turn: 1,
            followup_streak: 0,
            turn_limit_sec: 60,
            total_limit_sec: 600,
            started_at,
            ended_at: None,
        };
        let turn = Turn {
            session_id: id.to_string(),
            turn_index: 1,
            question_type: QuestionType::Base,
            question_text: "What is a module?".to_string(),
            answer_text: String::new(),
            submitted_at: None,
            metrics: json!({ "questionId": "q_1" }),
        };
        store.create_session(&session, &turn).await.unwrap();
        store
            .complete_session(
                &AnsweredTurn {
                    session_id: id.to_string(),
                    turn_index: 1,
                    answer_text: "A unit of encapsulation.".to_string(),
                    submitted_at: Utc::now(),
                    metrics: json!({ "questionId": "q_1", "answerDuration": 30 }),
                },
                Utc::now(),
            )
            .await
            .unwrap();
    }

    fn pipeline(store: &Arc<InMemorySessionStore>, reports: &Arc<ScriptedReports>) -> ReportPipeline {
        ReportPipeline::new(store.clone(), reports.clone())
    }

    #[tokio::test]
    async fn test_successful_generation_marks_done() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        completed_session(&store, "intv_a").await;

        let outcome = pipeline(&store, &reports).generate("intv_a").await.unwrap();
        assert_eq!(outcome, GenerateOutcome::Done { degraded: false });

        let data = store.load_session("intv_a").await.unwrap().unwrap();
        assert_eq!(data.session.status, SessionStatus::Done);
        let report = data.report.unwrap();
        assert_eq!(report.status, ReportStatus::Done);
        assert_eq!(report.total_score, Some(78.0));
        assert_eq!(report.model.as_deref(), Some("scripted-model"));
        assert_eq!(report.prompt_version.as_deref(), Some(PROMPT_VERSION));
        assert!(report.generated_at.is_some());
        assert!(report.duration_sec.unwrap() >= 125);
        let result = report.result.unwrap();
        assert_eq!(result["summary"], "Clear structure with room for more concrete detail.");
        assert_eq!(result["_rawText"], SAMPLE_REPORT);
        assert!(reports.last_prompt().unwrap().contains("A unit of encapsulation."));
    }

    #[tokio::test]
    async fn test_generate_is_idempotent_once_done() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        completed_session(&store, "intv_a").await;
        let pipeline = pipeline(&store, &reports);

        pipeline.generate("intv_a").await.unwrap();
        let first = store.load_report("intv_a").await.unwrap().unwrap();

        let outcome = pipeline.generate("intv_a").await.unwrap();
        assert_eq!(outcome, GenerateOutcome::AlreadyDone);
        assert_eq!(reports.calls(), 1);
        let second = store.load_report("intv_a").await.unwrap().unwrap();
        assert_eq!(first.generated_at, second.generated_at);
    }

    #[tokio::test]
    async fn test_prose_reply_is_stored_as_degraded_done() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        reports.reply_with(Ok("I could not produce JSON, sorry.".to_string()));
        completed_session(&store, "intv_a").await;

        let outcome = pipeline(&store, &reports).generate("intv_a").await.unwrap();
        assert_eq!(outcome, GenerateOutcome::Done { degraded: true });

        let report = store.load_report("intv_a").await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Done);
        assert_eq!(report.total_score, None);
        assert_eq!(
            report.result,
            Some(json!({ "_rawText": "I could not produce JSON, sorry." }))
        );
    }

    #[tokio::test]
    async fn test_string_score_is_not_stored_as_total() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        reports.reply_with(Ok("{\"totalScore\": \"88\"}".to_string()));
        completed_session(&store, "intv_a").await;

        pipeline(&store, &reports).generate("intv_a").await.unwrap();
        let report = store.load_report("intv_a").await.unwrap().unwrap();
        assert_eq!(report.total_score, None);
        assert_eq!(report.result.unwrap()["totalScore"], "88");
    }

    #[tokio::test]
    async fn test_provider_failure_marks_failed() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        reports.reply_with(Err(AiError::Provider("upstream 500".to_string())));
        completed_session(&store, "intv_a").await;

        let outcome = pipeline(&store, &reports).generate("intv_a").await.unwrap();
        assert_eq!(outcome, GenerateOutcome::Failed);

        let data = store.load_session("intv_a").await.unwrap().unwrap();
        assert_eq!(data.session.status, SessionStatus::Failed);
        let report = data.report.unwrap();
        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.error_message.unwrap().contains("upstream 500"));
        assert!(report.result.is_none());
        assert!(report.duration_sec.is_some());
    }

    #[tokio::test]
    async fn test_unknown_session_is_missing() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        let outcome = pipeline(&store, &reports).generate("intv_nope").await.unwrap();
        assert_eq!(outcome, GenerateOutcome::Missing);
        assert_eq!(reports.calls(), 0);
    }
}
