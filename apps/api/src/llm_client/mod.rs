/// LLM Client: the single point of entry for all generative-model calls.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// All question and report generation goes through a `CompletionBackend`
/// chosen once at startup from configuration.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AiProvider, Config};

pub mod chat;
pub mod openai;
pub mod prompts;
pub mod solar;

pub use openai::OpenAiBackend;
pub use solar::SolarBackend;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 3;
const INSUFFICIENT_QUOTA: &str = "insufficient_quota";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// The provider account has no quota left. Retrying will not help.
    pub fn is_insufficient_quota(&self) -> bool {
        matches!(
            self,
            LlmError::Api { status: 429, code: Some(code), .. } if code == INSUFFICIENT_QUOTA
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            LlmError::Api { status: 429, .. } | LlmError::RateLimited { .. }
        )
    }
}

/// One prompt/response exchange, independent of the provider's wire shape.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// A generative backend. Implement this to add a provider without touching
/// the question or report code.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the trimmed reply text. May be empty; callers decide whether
    /// that is an error.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;

    /// Model identifier recorded on generated reports.
    fn model(&self) -> &str;
}

/// Builds the backend selected by `AI_PROVIDER`.
pub fn build_backend(config: &Config) -> Result<Arc<dyn CompletionBackend>, LlmError> {
    let client = LlmClient::new(config.ai_api_key.clone(), config.ai_base_url.clone())?;
    let model = config.ai_model.clone();

    Ok(match config.ai_provider {
        AiProvider::OpenAi => Arc::new(OpenAiBackend::new(client, model)),
        AiProvider::Upstage => Arc::new(SolarBackend::new(client, model)),
    })
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<Value>,
}

/// Extracts `(code, message)` from an OpenAI-style error envelope.
/// Quota exhaustion is reported under either `code` or `type` depending on the provider.
fn parse_error_body(body: &str) -> (Option<String>, String) {
    let Ok(parsed) = serde_json::from_str::<ProviderError>(body) else {
        return (None, body.to_string());
    };
    let code = parsed
        .error
        .code
        .as_ref()
        .and_then(Value::as_str)
        .map(str::to_string);
    let kind = parsed.error.kind;

    let code = if code.as_deref() == Some(INSUFFICIENT_QUOTA) || kind.as_deref() == Some(INSUFFICIENT_QUOTA) {
        Some(INSUFFICIENT_QUOTA.to_string())
    } else {
        code.or(kind)
    };

    (code, parsed.error.message.unwrap_or_else(|| body.to_string()))
}

/// Shared HTTP transport for OpenAI-compatible APIs.
/// Handles auth, retries and error classification; adapters own the payload shapes.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POSTs `body` to `{base_url}/{path}` and decodes the JSON reply.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    /// A 429 caused by an exhausted quota is returned immediately.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let (code, message) = parse_error_body(&body);
                let error = LlmError::Api {
                    status: status.as_u16(),
                    code,
                    message,
                };

                if error.is_insufficient_quota() {
                    return Err(error);
                }
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!("LLM API returned {}: {}", status, body);
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            let decoded: R = response.json().await?;
            debug!("LLM call to {} succeeded", path);
            return Ok(decoded);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}
