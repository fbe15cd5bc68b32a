use crate::ai::types::{AiError, RetryPolicy};
use crate::ai::{post_json_with_retry, Message, MessageRole};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ClaudeCompletionRequest {
    model: String,
    messages: Vec<SimpleClaudeMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimpleClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeCompletionResponse {
    content: Vec<ClaudeResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeError,
}

#[derive(Debug, Deserialize)]
struct ClaudeError {
    message: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, endpoint: &str, model: &str, max_tokens: u32) -> Result<Self, AiError> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let auth_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| AiError::new(format!("Invalid API key format: {}", e)))?;
        auth_headers.insert("x-api-key", auth_value);
        auth_headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static("2023-06-01"),
        );

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
        // Claude takes the system prompt out of band; multiple system messages are joined
        let mut system_parts = Vec::new();
        let api_messages: Vec<SimpleClaudeMessage> = messages
            .into_iter()
            .filter_map(|m| {
                if m.role == MessageRole::System {
                    system_parts.push(m.content);
                    None
                } else {
                    Some(SimpleClaudeMessage {
                        role: m.role.as_str().to_string(),
                        content: m.content,
                    })
                }
            })
            .collect();

        let request = ClaudeCompletionRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: self.max_tokens,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
        };

        log::debug!("Sending request to Claude API: {:?}", request);

        let body = post_json_with_retry(&self.client, &self.endpoint, &self.auth_headers, &request, "CLAUDE", &self.retry)
            .await
            .map_err(|e| match (e.status_code, serde_json::from_str::<ClaudeErrorResponse>(&e.message)) {
                (Some(code), Ok(parsed)) => {
                    AiError::with_status(format!("Claude API error: {}", parsed.error.message), code)
                }
                _ => e,
            })?;

        let response_data: ClaudeCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::new(format!("Failed to parse Claude response: {}", e)))?;

        if let Some(reason) = &response_data.stop_reason {
            log::debug!("[CLAUDE] stop_reason={}", reason);
        }

        // Concatenate all text content from response
        let content: String = response_data
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.clone())
            .collect();

        if content.is_empty() {
            return Err(AiError::new("Claude API returned no content"));
        }

        Ok(content)
    }
}
