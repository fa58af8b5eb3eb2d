//! Scripted generators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AiError, GeneratedQuestion, QuestionGenerator, QuestionRequest, ReportGenerator};

/// Answers every request with a deterministic question unless a failure is queued.
#[derive(Default)]
pub struct ScriptedQuestions {
    requests: Mutex<Vec<QuestionRequest>>,
    failures: Mutex<VecDeque<AiError>>,
}

impl ScriptedQuestions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, error: AiError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn requests(&self) -> Vec<QuestionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedQuestions {
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion, AiError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let kind = if request.is_followup { "Follow-up" } else { "Base" };
        Ok(GeneratedQuestion {
            question_id: format!("q_test_{}", request.turn_index),
            text: format!("{kind} question {}?", request.turn_index),
        })
    }
}

pub const SAMPLE_REPORT: &str = r#"{
    "version": "v1",
    "totalScore": 78,
    "summary": "Clear structure with room for more concrete detail.",
    "strengths": ["Logical structure"],
    "weaknesses": ["Few concrete numbers"],
    "competencies": { "items": [
        { "key": "LOGIC", "label": "Logic", "level": "good", "score": 20, "comment": "Solid" }
    ] },
    "perTurnFeedback": [
        { "turnIndex": 1, "score": 7, "feedback": "Good start",
          "highlight": { "strength": "Clear", "weakness": "Vague", "suggestion": "Add metrics" } }
    ]
}"#;

/// Replays queued replies, then falls back to `SAMPLE_REPORT`. Counts calls.
#[derive(Default)]
pub struct ScriptedReports {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedReports {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply_with(&self, reply: Result<String, AiError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ReportGenerator for ScriptedReports {
    async fn generate_report_text(&self, prompt: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SAMPLE_REPORT.to_string()))
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}
