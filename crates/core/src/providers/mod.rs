//! HTTP clients for the embedding, reranking and chat-completion services.
//!
//! Each client owns the provider-side retry policy: transient failures
//! (timeouts, connection errors, 429 and 5xx answers) are retried with
//! exponential backoff up to a bounded number of attempts.

pub mod openai;
pub mod voyage;

pub use openai::OpenAiChat;
pub use voyage::{VoyageConfig, VoyageEmbedder, VoyageReranker};

use crate::error::ProviderError;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.min(5))
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> Result<Url, ProviderError> {
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
    Ok(base.join(path)?)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

pub(crate) async fn send_with_retry<F>(
    provider: &'static str,
    policy: RetryPolicy,
    build: F,
) -> Result<Response, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                if is_retryable_status(status) && attempt < policy.max_retries {
                    attempt += 1;
                    tracing::debug!(provider, %status, attempt, "retrying provider request");
                    tokio::time::sleep(policy.backoff(attempt)).await;
                    continue;
                }
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                return Err(ProviderError::Status {
                    provider,
                    status: status.as_u16(),
                    body,
                });
            }
            Err(error) => {
                if is_retryable_error(&error) && attempt < policy.max_retries {
                    attempt += 1;
                    tracing::debug!(provider, %error, attempt, "retrying provider request");
                    tokio::time::sleep(policy.backoff(attempt)).await;
                    continue;
                }
                return Err(error.into());
            }
        }
    }
}
