// Evaluation prompt for the report pipeline.

use serde::Serialize;
use serde_json::Value;

use crate::models::interview::{QuestionType, SessionWithTurns};

/// Bumped whenever the rubric or schema below changes; stored on every report.
pub const PROMPT_VERSION: &str = "v1";

pub const COMPETENCY_KEYS: [&str; 6] = [
    "LOGIC",
    "TIME_MANAGEMENT",
    "SPECIFICITY",
    "STAR_METHOD",
    "EYE_CONTACT",
    "VOICE_TONE",
];

const REPORT_PROMPT_HEADER: &str = r#"You are an experienced technical interview evaluator.
Produce an evaluation report from the interview transcript below that a client can render without post-processing.

OUTPUT RULES:
- Output a single JSON object. The first character must be { and the last must be }.
- No explanations, markdown, comments or code fences. Never wrap the JSON in a string.
- Numbers are JSON numbers, never strings.
- Do not add keys that are not in the schema. Use null for unknown values.
- If you cannot follow these rules, output {}.

METRICS RULES:
- metrics are optional per-turn signals. Use them only when present.
- If a metric's key or unit is unclear, do not guess; treat it as null.
- Always evaluate the answer text even when metrics are missing.

FIXED ENUMS (never change):
- competencyKey: ["LOGIC","TIME_MANAGEMENT","SPECIFICITY","STAR_METHOD","EYE_CONTACT","VOICE_TONE"]
- competencyLevel: ["excellent","good","fair","needs improvement"]
- severity: ["INFO","WARNING","CRITICAL"]

RUBRIC (totalScore 0-100):
- LOGIC 25: clear structure (claim-evidence-example, cause-fix-result).
- SPECIFICITY 20: numbers, durations, comparisons or scope.
- COMMUNICATION 20: gets to the point, explains terms, listener-oriented.
- PROBLEM_SOLVING 20: alternatives, trade-offs, verification, retrospection.
- TIME_MANAGEMENT 15: neither rambling nor too short.

JSON SCHEMA (output exactly this shape):
{
  "version": "v1",
  "session": { "sessionId": string, "title": string | null, "topic": string | null },
  "totalScore": number,
  "summary": string,
  "strengths": string[],
  "weaknesses": string[],
  "competencies": {
    "items": [
      { "key": "LOGIC", "label": "Logic", "level": string, "score": number, "comment": string },
      { "key": "TIME_MANAGEMENT", "label": "Time management", "level": string, "score": number, "comment": string },
      { "key": "SPECIFICITY", "label": "Specificity", "level": string, "score": number, "comment": string },
      { "key": "STAR_METHOD", "label": "STAR method", "level": string, "score": number, "comment": string },
      { "key": "EYE_CONTACT", "label": "Eye contact", "level": string, "score": number, "comment": string },
      { "key": "VOICE_TONE", "label": "Voice tone", "level": string, "score": number, "comment": string }
    ]
  },
  "textPatternAnalysis": {
    "issues": [ { "type": string, "severity": string, "description": string, "affectedTurnIndexes": number[] } ]
  },
  "perTurnFeedback": [
    {
      "turnIndex": number,
      "score": number,
      "feedback": string,
      "highlight": { "strength": string | null, "weakness": string | null, "suggestion": string | null }
    }
  ]
}

GENERATION RULES:
- perTurnFeedback has exactly one entry per input turn.
- strengths and weaknesses: 2 to 5 distinct items each.
- textPatternAnalysis.issues: at most 5.
- summary: 2 to 4 sentences.
- The competency scores should trend with totalScore; an exact match is not required."#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptTurn<'a> {
    turn_index: i32,
    question_type: QuestionType,
    question_text: &'a str,
    answer_text: &'a str,
    metrics: &'a Value,
}

/// Builds the evaluation prompt. Only turns with a non-empty answer are included.
pub fn build_report_prompt(data: &SessionWithTurns) -> String {
    let session = &data.session;
    let turns: Vec<PromptTurn<'_>> = data
        .answered_turns()
        .map(|t| PromptTurn {
            turn_index: t.turn_index,
            question_type: t.question_type,
            question_text: &t.question_text,
            answer_text: &t.answer_text,
            metrics: &t.metrics,
        })
        .collect();
    let turns_json = serde_json::to_string(&turns).unwrap_or_else(|_| "[]".to_string());
    let topic = serde_json::to_string(&session.topic).unwrap_or_else(|_| "null".to_string());

    format!(
        "{REPORT_PROMPT_HEADER}\n\nINPUT:\nsessionId: {}\ntitle: {}\ntopic: {}\nturns(JSON):\n{}",
        session.session_id,
        session.title.as_deref().unwrap_or("null"),
        topic,
        turns_json
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::interview::{Session, SessionStatus, Topic, Turn};

    fn turn(index: i32, answer: &str) -> Turn {
        Turn {
            session_id: "intv_1".to_string(),
            turn_index: index,
            question_type: QuestionType::Base,
            question_text: format!("Question {index}?"),
            answer_text: answer.to_string(),
            submitted_at: None,
            metrics: json!({ "answerDuration": 20 }),
        }
    }

    fn data(turns: Vec<Turn>) -> SessionWithTurns {
        SessionWithTurns {
            session: Session {
                session_id: "intv_1".to_string(),
                owner_id: None,
                title: None,
                topic: Topic {
                    main_topic_id: "backend".to_string(),
                    sub_topic_ids: vec!["nestjs".to_string()],
                },
                status: SessionStatus::Analyzing,
                current_turn: 2,
                followup_streak: 0,
                turn_limit_sec: 60,
                total_limit_sec: 600,
                started_at: Utc::now(),
                ended_at: None,
            },
            turns,
            report: None,
        }
    }

    #[test]
    fn test_prompt_includes_only_answered_turns() {
        let prompt = build_report_prompt(&data(vec![turn(1, "An answer"), turn(2, "  ")]));
        assert!(prompt.contains("\"questionText\":\"Question 1?\""));
        assert!(!prompt.contains("Question 2?"));
        assert!(prompt.contains("sessionId: intv_1"));
        assert!(prompt.contains("title: null"));
    }

    #[test]
    fn test_prompt_lists_every_competency_key() {
        let prompt = build_report_prompt(&data(vec![]));
        for key in COMPETENCY_KEYS {
            assert!(prompt.contains(key), "missing {key}");
        }
        assert!(prompt.contains("turns(JSON):\n[]"));
    }
}
