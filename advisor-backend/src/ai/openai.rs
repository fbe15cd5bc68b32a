use crate::ai::types::{AiError, RetryPolicy};
use crate::ai::{post_json_with_retry, Message};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

/// Client for OpenAI-compatible chat completion endpoints
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: &str, model: &str, max_tokens: u32) -> Result<Self, AiError> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // Self-hosted compatible endpoints often run without a key
        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| AiError::new(format!("Invalid API key format: {}", e)))?;
            auth_headers.insert(header::AUTHORIZATION, auth_value);
        }

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            max_tokens,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        let request = OpenAICompletionRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str().to_string(),
                    content: Some(m.content),
                })
                .collect(),
            max_tokens: self.max_tokens,
        };

        log::debug!("Sending request to OpenAI-compatible API {}: model={}", self.endpoint, self.model);

        let body = post_json_with_retry(&self.client, &self.endpoint, &self.auth_headers, &request, "OPENAI", &self.retry)
            .await
            .map_err(|e| match (e.status_code, serde_json::from_str::<OpenAIErrorResponse>(&e.message)) {
                (Some(code), Ok(parsed)) => {
                    AiError::with_status(format!("OpenAI API error: {}", parsed.error.message), code)
                }
                _ => e,
            })?;

        let response_data: OpenAICompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::new(format!("Failed to parse OpenAI response: {}", e)))?;

        let choice = response_data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::new("OpenAI API returned no choices"))?;

        if let Some(reason) = &choice.finish_reason {
            log::debug!("[OPENAI] finish_reason={}", reason);
        }

        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(AiError::new("OpenAI API returned no content")),
        }
    }
}
