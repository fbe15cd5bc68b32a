use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// AI API error with status code information
#[derive(Debug, Clone, PartialEq)]
pub struct AiError {
    /// Error message
    pub message: String,
    /// HTTP status code if available
    pub status_code: Option<u16>,
}

impl AiError {
    pub fn new(message: impl Into<String>) -> Self {
        AiError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        AiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this is a client error (4xx status code)
    pub fn is_client_error(&self) -> bool {
        self.status_code.map(|c| (400..500).contains(&c)).unwrap_or(false)
    }

    /// Check if this is a server error (5xx status code)
    pub fn is_server_error(&self) -> bool {
        self.status_code.map(|c| c >= 500).unwrap_or(false)
    }

    /// Check if this error indicates the context/input is too large
    pub fn is_context_too_large(&self) -> bool {
        let msg = self.message.to_lowercase();
        msg.contains("too large")
            || msg.contains("exceeds maximum")
            || msg.contains("input tokens")
            || msg.contains("context length")
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AiError {}

impl From<String> for AiError {
    fn from(s: String) -> Self {
        AiError::new(s)
    }
}

impl From<&str> for AiError {
    fn from(s: &str) -> Self {
        AiError::new(s)
    }
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// Hugging Face inference router (OpenAI-compatible)
    HuggingFace,
    /// OpenAI or any OpenAI-compatible endpoint
    OpenAI,
    /// Anthropic messages API
    Claude,
}

impl AiProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "huggingface" | "hf" => Some(AiProvider::HuggingFace),
            "openai" | "openai_compatible" => Some(AiProvider::OpenAI),
            "claude" | "anthropic" => Some(AiProvider::Claude),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::HuggingFace => "huggingface",
            AiProvider::OpenAI => "openai",
            AiProvider::Claude => "claude",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            AiProvider::HuggingFace => "https://router.huggingface.co/v1/chat/completions",
            AiProvider::OpenAI => "https://api.openai.com/v1/chat/completions",
            AiProvider::Claude => "https://api.anthropic.com/v1/messages",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::HuggingFace => "Qwen/Qwen2.5-Coder-32B-Instruct",
            AiProvider::OpenAI => "gpt-4o-mini",
            AiProvider::Claude => "claude-sonnet-4-20250514",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider settings resolved from the environment
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub provider: AiProvider,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

/// How transient provider failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 2000;

    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(Self::DEFAULT_BASE_DELAY_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AiError::with_status("bad request", 400).is_client_error());
        assert!(AiError::with_status("overloaded", 503).is_server_error());
        assert!(!AiError::new("no status").is_server_error());
        assert!(AiError::new("prompt exceeds maximum context length").is_context_too_large());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(AiError::with_status("boom", 502).to_string(), "[HTTP 502] boom");
        assert_eq!(AiError::new("boom").to_string(), "boom");
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(AiProvider::from_str("HF"), Some(AiProvider::HuggingFace));
        assert_eq!(AiProvider::from_str(" anthropic "), Some(AiProvider::Claude));
        assert_eq!(AiProvider::from_str("llama"), None);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(8000));
    }
}
