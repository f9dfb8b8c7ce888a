use super::{endpoint, send_with_retry, RetryPolicy};
use crate::error::ProviderError;
use crate::traits::{ChatModel, ChatRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const PROVIDER: &str = "chat";

/// Chat-completion client for OpenAI-compatible servers such as a local Ollama.
pub struct OpenAiChat {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint(base_url, "chat/completions")?,
            api_key: api_key.into(),
            model: model.into(),
            retry,
        })
    }

    fn body<'a>(&'a self, request: &'a ChatRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let body = self.body(request);
        let response = send_with_retry(PROVIDER, self.retry, || {
            let builder = self.client.post(self.endpoint.clone()).json(&body);
            if self.api_key.trim().is_empty() {
                builder
            } else {
                builder.bearer_auth(self.api_key.trim())
            }
        })
        .await?;

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ProviderError::InvalidResponse {
                provider: PROVIDER,
                details: "completion had no message content".to_string(),
            })
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
