//! Upstage Solar adapter. Solar speaks the Chat Completions dialect directly.

use async_trait::async_trait;

use super::chat::{self, TokenLimitField};
use super::{CompletionBackend, CompletionRequest, LlmClient, LlmError};

pub struct SolarBackend {
    client: LlmClient,
    model: String,
}

impl SolarBackend {
    pub fn new(client: LlmClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl CompletionBackend for SolarBackend {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        chat::complete(
            &self.client,
            &self.model,
            request,
            TokenLimitField::MaxTokens,
            true,
        )
        .await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
