//! Turns an untrusted model reply into a JSON object, or admits it cannot.

use serde_json::{Map, Value};

/// Key under which the raw model reply is kept in the stored result.
pub const RAW_TEXT_KEY: &str = "_rawText";

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReport {
    Parsed(Map<String, Value>),
    /// No stage produced a JSON object; only the raw text survives.
    Degraded,
}

impl ParsedReport {
    /// The stored result: the parsed object plus the raw reply, or the raw reply alone.
    pub fn into_result(self, raw: &str) -> Value {
        let mut object = match self {
            ParsedReport::Parsed(object) => object,
            ParsedReport::Degraded => Map::new(),
        };
        object.insert(RAW_TEXT_KEY.to_string(), Value::String(raw.to_string()));
        Value::Object(object)
    }
}

/// Each stage runs only if the previous one did not yield an object:
/// fenced or bare JSON, JSON double-encoded as a string, then the slice
/// between the first `{` and the last `}`.
pub fn parse_report_reply(raw: &str) -> ParsedReport {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedReport::Degraded;
    }

    let candidate = strip_json_fences(trimmed);

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => return ParsedReport::Parsed(object),
        Ok(Value::String(inner)) => {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&inner) {
                return ParsedReport::Parsed(object);
            }
        }
        _ => {}
    }

    if let (Some(first), Some(last)) = (candidate.find('{'), candidate.rfind('}')) {
        if last > first {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&candidate[first..=last]) {
                return ParsedReport::Parsed(object);
            }
        }
    }

    ParsedReport::Degraded
}

/// Returns the body of the first ```` ``` ```` fence (optionally tagged `json`)
/// anywhere in `text`, or `text` itself when there is no complete fence.
fn strip_json_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    let body = match after_open.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &after_open[4..],
        _ => after_open,
    };
    match body.find("```") {
        Some(close) => {
            let inner = body[..close].trim();
            if inner.is_empty() {
                text
            } else {
                inner
            }
        }
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_of(parsed: &ParsedReport) -> Option<i64> {
        match parsed {
            ParsedReport::Parsed(object) => object.get("totalScore").and_then(Value::as_i64),
            ParsedReport::Degraded => None,
        }
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), input);
    }

    #[test]
    fn test_bare_object() {
        assert_eq!(score_of(&parse_report_reply("{\"totalScore\": 81}")), Some(81));
    }

    #[test]
    fn test_fenced_object_with_prose_around_it() {
        let reply = "Here is the report:\n```JSON\n{\"totalScore\": 64}\n```\nThanks";
        assert_eq!(score_of(&parse_report_reply(reply)), Some(64));
    }

    #[test]
    fn test_double_encoded_object() {
        let reply = serde_json::to_string("{\"totalScore\": 70}").unwrap();
        assert_eq!(score_of(&parse_report_reply(&reply)), Some(70));
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let reply = "Sure! {\"totalScore\": 55, \"summary\": \"ok\"} Hope this helps.";
        assert_eq!(score_of(&parse_report_reply(reply)), Some(55));
    }

    #[test]
    fn test_unparseable_inputs_degrade() {
        for reply in ["", "   ", "plain prose only", "[1, 2, 3]", "\"just a string\"", "} backwards {"] {
            assert_eq!(parse_report_reply(reply), ParsedReport::Degraded, "{reply:?}");
        }
    }

    #[test]
    fn test_into_result_keeps_raw_text() {
        let raw = "{\"totalScore\": 90}";
        let result = parse_report_reply(raw).into_result(raw);
        assert_eq!(result["totalScore"], 90);
        assert_eq!(result[RAW_TEXT_KEY], raw);

        let degraded = ParsedReport::Degraded.into_result("prose");
        assert_eq!(degraded, serde_json::json!({ "_rawText": "prose" }));
    }
}
