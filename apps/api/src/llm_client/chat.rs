//! Chat Completions wire format, shared by the Solar adapter and the OpenAI fallback path.

use serde::{Deserialize, Serialize};

use super::{CompletionRequest, LlmClient, LlmError};

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// How the token ceiling is named in the request body.
/// Newer OpenAI models reject `max_tokens` in favour of `max_completion_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimitField {
    MaxTokens,
    MaxCompletionTokens,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl ChatResponse {
    fn text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }
}

/// Sends a system + user message pair and returns the first choice's text.
pub async fn complete(
    client: &LlmClient,
    model: &str,
    request: &CompletionRequest<'_>,
    limit_field: TokenLimitField,
    include_temperature: bool,
) -> Result<String, LlmError> {
    let body = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: request.system,
            },
            ChatMessage {
                role: "user",
                content: request.prompt,
            },
        ],
        temperature: request.temperature.filter(|_| include_temperature),
        max_tokens: (limit_field == TokenLimitField::MaxTokens).then_some(request.max_tokens),
        max_completion_tokens: (limit_field == TokenLimitField::MaxCompletionTokens)
            .then_some(request.max_tokens),
    };

    let response: ChatResponse = client.post_json(CHAT_COMPLETIONS_PATH, &body).await?;
    Ok(response.text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_text_takes_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  What is a mutex?  "}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "What is a mutex?");
    }

    #[test]
    fn test_chat_response_without_choices_is_empty() {
        let response: ChatResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), "");
    }

    #[test]
    fn test_request_names_token_limit_per_field() {
        let body = ChatRequest {
            model: "gpt-5-nano",
            messages: vec![],
            temperature: None,
            max_tokens: None,
            max_completion_tokens: Some(500),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_completion_tokens"], 500);
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
    }
}
