//! Total projection from a stored (variably shaped) report result into the
//! fixed view clients render. Never fails: each missing or mistyped field
//! falls back to its own default.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::interview::{QuestionType, SessionWithTurns};

const MAX_ACTION_ITEMS: usize = 6;
const PLACEHOLDER_SUMMARY: &str =
    "There is not enough analysis yet to produce a summary for this interview.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub header: ViewHeader,
    pub summary: ViewSummary,
    pub analysis: ViewAnalysis,
    pub coaching: ViewCoaching,
    pub record: ViewRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewHeader {
    pub title: String,
    pub summary: String,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSummary {
    pub total_score: Option<f64>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub competencies: Vec<Competency>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Competency {
    pub key: String,
    pub label: String,
    pub level: String,
    pub score: Option<f64>,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAnalysis {
    pub text_pattern_issues: Vec<TextPatternIssue>,
    pub per_turn_scores: Vec<TurnScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPatternIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub description: String,
    pub affected_turn_indexes: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnScore {
    pub turn_index: i32,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCoaching {
    pub action_items: Vec<String>,
    pub turn_suggestions: Vec<TurnSuggestion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSuggestion {
    pub turn_index: i32,
    pub question: String,
    pub weakness: Option<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub turns: Vec<RecordTurn>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTurn {
    pub turn_index: i32,
    pub question_type: QuestionType,
    pub question_text: String,
    pub answer_text: String,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub highlight: Option<Highlight>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub metrics: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub strength: Option<String>,
    pub weakness: Option<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct TurnFeedback {
    score: Option<f64>,
    feedback: Option<String>,
    highlight: Option<Highlight>,
}

// ─── Lenient accessors ───────────────────────────────────────────────────────

pub fn as_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value.and_then(Value::as_object)
}

/// Finite JSON numbers only.
pub fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|n| n.is_finite())
}

/// Finite JSON numbers, or strings that parse as one.
pub fn lenient_number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        other => number(other),
    }
}

pub fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_or(value: Option<&Value>, fallback: &str) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

// ─── Normalization ───────────────────────────────────────────────────────────

/// Builds the view for a session. Every turn of the session appears in the
/// record, joined with its per-turn feedback when the result has one.
pub fn normalize(data: &SessionWithTurns) -> ReportView {
    let report = data.report.as_ref();
    let result = as_object(report.and_then(|r| r.result.as_ref()));
    let field = |key: &str| result.and_then(|r| r.get(key));

    let feedback_by_turn = per_turn_feedback(field("perTurnFeedback"));

    let competencies = objects(as_object(field("competencies")).and_then(|c| c.get("items")))
        .map(|item| Competency {
            key: string_or(item.get("key"), "UNKNOWN"),
            label: string_or(item.get("label"), "Unclassified"),
            level: string_or(item.get("level"), "fair"),
            score: number(item.get("score")),
            comment: string_or(item.get("comment"), ""),
        })
        .collect();

    let text_pattern_issues =
        objects(as_object(field("textPatternAnalysis")).and_then(|t| t.get("issues")))
            .map(|item| TextPatternIssue {
                kind: string_or(item.get("type"), "other"),
                severity: string_or(item.get("severity"), "INFO"),
                description: string_or(item.get("description"), ""),
                affected_turn_indexes: item
                    .get("affectedTurnIndexes")
                    .and_then(Value::as_array)
                    .map(|xs| xs.iter().filter_map(|x| number(Some(x))).collect())
                    .unwrap_or_default(),
            })
            .collect();

    let record_turns: Vec<RecordTurn> = data
        .turns
        .iter()
        .map(|turn| {
            let feedback = feedback_by_turn
                .get(&i64::from(turn.turn_index))
                .cloned()
                .unwrap_or_default();
            RecordTurn {
                turn_index: turn.turn_index,
                question_type: turn.question_type,
                question_text: turn.question_text.clone(),
                answer_text: turn.answer_text.clone(),
                score: feedback.score,
                feedback: feedback.feedback,
                highlight: feedback.highlight,
                submitted_at: turn.submitted_at,
                metrics: turn.metrics.as_object().cloned(),
            }
        })
        .collect();

    let weaknesses = string_list(field("weaknesses"));
    let action_items = action_items(&weaknesses, &record_turns);

    let turn_suggestions = record_turns
        .iter()
        .filter_map(|turn| {
            let highlight = turn.highlight.as_ref()?;
            let flagged = highlight.weakness.as_deref().is_some_and(|s| !s.is_empty())
                || highlight.suggestion.as_deref().is_some_and(|s| !s.is_empty());
            flagged.then(|| TurnSuggestion {
                turn_index: turn.turn_index,
                question: turn.question_text.clone(),
                weakness: highlight.weakness.clone(),
                suggestion: highlight.suggestion.clone(),
            })
        })
        .collect();

    let session = &data.session;
    ReportView {
        header: ViewHeader {
            title: session
                .title
                .clone()
                .unwrap_or_else(|| format!("{} interview report", session.session_id)),
            summary: string_or(field("summary"), PLACEHOLDER_SUMMARY),
            generated_at: report.and_then(|r| r.generated_at),
        },
        summary: ViewSummary {
            total_score: number(field("totalScore")).or(report.and_then(|r| r.total_score)),
            strengths: string_list(field("strengths")),
            weaknesses,
            competencies,
        },
        analysis: ViewAnalysis {
            text_pattern_issues,
            per_turn_scores: record_turns
                .iter()
                .map(|t| TurnScore {
                    turn_index: t.turn_index,
                    score: t.score,
                })
                .collect(),
        },
        coaching: ViewCoaching {
            action_items,
            turn_suggestions,
        },
        record: ViewRecord {
            turns: record_turns,
        },
    }
}

fn per_turn_feedback(value: Option<&Value>) -> HashMap<i64, TurnFeedback> {
    let mut by_turn = HashMap::new();
    for item in objects(value) {
        // Integral floats such as `3.0` count; zero and fractions match no turn.
        let Some(turn_index) = number(item.get("turnIndex"))
            .filter(|n| n.fract() == 0.0 && *n != 0.0 && n.abs() <= i64::MAX as f64)
            .map(|n| n as i64)
        else {
            continue;
        };
        let highlight = as_object(item.get("highlight")).map(|h| Highlight {
            strength: optional_string(h.get("strength")),
            weakness: optional_string(h.get("weakness")),
            suggestion: optional_string(h.get("suggestion")),
        });
        by_turn.insert(
            turn_index,
            TurnFeedback {
                score: number(item.get("score")),
                feedback: optional_string(item.get("feedback")).filter(|f| !f.trim().is_empty()),
                highlight,
            },
        );
    }
    by_turn
}

/// Weaknesses first, then per-turn suggestions; blanks and repeats dropped.
fn action_items(weaknesses: &[String], turns: &[RecordTurn]) -> Vec<String> {
    let suggestions = turns
        .iter()
        .filter_map(|t| t.highlight.as_ref()?.suggestion.as_ref());

    let mut seen = HashSet::new();
    weaknesses
        .iter()
        .chain(suggestions)
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.to_string()))
        .take(MAX_ACTION_ITEMS)
        .map(str::to_string)
        .collect()
}
