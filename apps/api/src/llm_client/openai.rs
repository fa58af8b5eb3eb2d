//! OpenAI adapter: Responses API first, one Chat Completions fallback when the
//! Responses API comes back without any text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::chat::{self, TokenLimitField};
use super::{CompletionBackend, CompletionRequest, LlmClient, LlmError};

const RESPONSES_PATH: &str = "responses";

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesReply {
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Either a plain string or `{ "value": "..." }`.
    text: Option<Value>,
}

impl ResponsesReply {
    fn text(&self) -> String {
        if let Some(text) = self.output_text.as_deref().map(str::trim) {
            if !text.is_empty() {
                return text.to_string();
            }
        }

        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|c| matches!(c.kind.as_deref(), Some("output_text") | Some("text")))
            .filter_map(|c| match c.text.as_ref()? {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("value").and_then(Value::as_str),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

pub struct OpenAiBackend {
    client: LlmClient,
    model: String,
}

impl OpenAiBackend {
    pub fn new(client: LlmClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let body = ResponsesRequest {
            model: &self.model,
            instructions: request.system,
            input: request.prompt,
            max_output_tokens: request.max_tokens,
        };

        let reply: ResponsesReply = self.client.post_json(RESPONSES_PATH, &body).await?;
        let text = reply.text();
        if !text.is_empty() {
            return Ok(text);
        }

        warn!(
            "OpenAI responses API returned empty text, falling back to chat completions (model={})",
            self.model
        );
        chat::complete(
            &self.client,
            &self.model,
            request,
            TokenLimitField::MaxCompletionTokens,
            false,
        )
        .await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_prefers_output_text() {
        let reply: ResponsesReply =
            serde_json::from_str(r#"{"output_text":" hello ","output":[]}"#).unwrap();
        assert_eq!(reply.text(), "hello");
    }

    #[test]
    fn test_reply_joins_output_segments() {
        let reply: ResponsesReply = serde_json::from_str(
            r#"{
                "output": [
                    {"type": "reasoning", "content": []},
                    {"type": "message", "content": [
                        {"type": "output_text", "text": "first"},
                        {"type": "refusal", "text": "ignored"},
                        {"type": "text", "text": {"value": "second"}}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(reply.text(), "first\nsecond");
    }

    #[test]
    fn test_reply_without_text_is_empty() {
        let reply: ResponsesReply = serde_json::from_str(r#"{"output":[{"content":[]}]}"#).unwrap();
        assert_eq!(reply.text(), "");
    }
}
