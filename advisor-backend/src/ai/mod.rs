pub mod claude;
#[cfg(test)]
pub mod mock;
pub mod openai;
pub mod types;

pub use claude::ClaudeClient;
#[cfg(test)]
pub use mock::MockAiClient;
pub use openai::OpenAIClient;
pub use types::{AiError, AiProvider, AiSettings, RetryPolicy};

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Unified AI client that works with any configured provider
pub enum AiClient {
    Claude(ClaudeClient),
    OpenAI(OpenAIClient),
    #[cfg(test)]
    Mock(MockAiClient),
}

impl AiClient {
    /// Create an AI client from provider settings
    pub fn from_settings(settings: &AiSettings) -> Result<Self, AiError> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .unwrap_or(settings.provider.default_endpoint());
        let model = settings
            .model
            .as_deref()
            .unwrap_or(settings.provider.default_model());

        match settings.provider {
            AiProvider::Claude => {
                let client = ClaudeClient::new(&settings.api_key, endpoint, model, settings.max_tokens)?
                    .with_retry(settings.retry);
                Ok(AiClient::Claude(client))
            }
            // The Hugging Face router speaks the OpenAI chat completions dialect
            AiProvider::OpenAI | AiProvider::HuggingFace => {
                let client = OpenAIClient::new(&settings.api_key, endpoint, model, settings.max_tokens)?
                    .with_retry(settings.retry);
                Ok(AiClient::OpenAI(client))
            }
        }
    }

    /// Generate text using the configured provider
    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        match self {
            AiClient::Claude(client) => client.generate_text(messages).await,
            AiClient::OpenAI(client) => client.generate_text(messages).await,
            #[cfg(test)]
            AiClient::Mock(client) => client.generate_text(messages).await,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            AiClient::Claude(_) => "claude",
            AiClient::OpenAI(_) => "openai",
            #[cfg(test)]
            AiClient::Mock(_) => "mock",
        }
    }
}

/// POST a JSON body and return the successful response body.
///
/// Transport failures and 429/502/503/504 are retried with exponential
/// backoff. Other non-success statuses are returned as `AiError` carrying the
/// status code and the raw body, so callers can extract provider messages.
pub(crate) async fn post_json_with_retry<T: Serialize + ?Sized>(
    client: &Client,
    endpoint: &str,
    headers: &header::HeaderMap,
    body: &T,
    tag: &str,
    retry: &RetryPolicy,
) -> Result<String, AiError> {
    let mut last_error: Option<AiError> = None;

    for attempt in 0..=retry.max_retries {
        if attempt > 0 {
            let delay = retry.delay_before(attempt);
            log::warn!(
                "[{}] Retry attempt {}/{} after {}ms delay",
                tag,
                attempt,
                retry.max_retries,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match client
            .post(endpoint)
            .headers(headers.clone())
            .json(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::warn!("[{}] Request failed (attempt {}): {}", tag, attempt + 1, e);
                last_error = Some(AiError::new(format!("{} request failed: {}", tag, e)));
                continue;
            }
        };

        let status = response.status();
        let status_code = status.as_u16();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok(text);
        }

        let error = AiError::with_status(text, status_code);
        if matches!(status_code, 429 | 502 | 503 | 504) && attempt < retry.max_retries {
            log::warn!(
                "[{}] Received retryable status {} (attempt {}), will retry",
                tag,
                status,
                attempt + 1
            );
            last_error = Some(error);
            continue;
        }
        return Err(error);
    }

    Err(last_error.unwrap_or_else(|| AiError::new("Max retries exceeded")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedServer;
    use serde_json::json;
    use std::time::Duration;

    fn immediate(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    async fn post(url: &str, retry: RetryPolicy) -> Result<String, AiError> {
        post_json_with_retry(
            crate::http::shared_client(),
            url,
            &header::HeaderMap::new(),
            &json!({"model": "m"}),
            "TEST",
            &retry,
        )
        .await
    }

    #[actix_web::test]
    async fn test_retryable_status_then_success() {
        let server = ScriptedServer::start(vec![(503, "busy"), (429, "slow down"), (200, "{\"ok\":true}")]);

        let body = post(&server.url(), immediate(3)).await.unwrap();
        assert_eq!(body, "{\"ok\":true}");
        assert_eq!(server.request_count(), 3);
    }

    #[actix_web::test]
    async fn test_client_error_fails_without_retry() {
        let server = ScriptedServer::start(vec![(400, "bad request"), (200, "never reached")]);

        let err = post(&server.url(), immediate(3)).await.unwrap_err();
        assert_eq!(err.status_code, Some(400));
        assert_eq!(err.message, "bad request");
        assert_eq!(server.request_count(), 1);
    }

    #[actix_web::test]
    async fn test_persistent_overload_returns_last_error() {
        let server = ScriptedServer::start(vec![(502, "gateway"), (504, "still down")]);

        let err = post(&server.url(), immediate(2)).await.unwrap_err();
        assert_eq!(err.status_code, Some(504));
        assert_eq!(err.message, "still down");
        // one initial attempt plus two retries
        assert_eq!(server.request_count(), 3);
    }

    #[actix_web::test]
    async fn test_transport_error_is_retried_then_reported() {
        // Nothing listens on a freshly released port
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = post(&format!("http://127.0.0.1:{}/v1", port), immediate(1)).await.unwrap_err();
        assert_eq!(err.status_code, None);
        assert!(err.message.starts_with("TEST request failed"), "{}", err.message);
    }

    #[actix_web::test]
    async fn test_openai_client_parses_reply_after_retry() {
        let server = ScriptedServer::start(vec![
            (503, "busy"),
            (200, r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"},"finish_reason":"stop"}]}"#),
        ]);
        let client = OpenAIClient::new("", &server.url(), "test-model", 64)
            .unwrap()
            .with_retry(immediate(3));

        let text = client.generate_text(vec![Message::user("hello")]).await.unwrap();
        assert_eq!(text, "Hi there");
        assert_eq!(server.request_count(), 2);
    }

    #[actix_web::test]
    async fn test_openai_error_body_is_unwrapped() {
        let server = ScriptedServer::start(vec![(401, r#"{"error":{"message":"Invalid token"}}"#)]);
        let client = OpenAIClient::new("", &server.url(), "test-model", 64)
            .unwrap()
            .with_retry(immediate(3));

        let err = client.generate_text(vec![Message::user("hello")]).await.unwrap_err();
        assert_eq!(err, AiError::with_status("OpenAI API error: Invalid token", 401));
    }
}
