//! Scripted AI client for tests.

use crate::ai::{AiError, Message};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Returns queued responses in order and records every prompt it receives.
pub struct MockAiClient {
    responses: Mutex<VecDeque<Result<String, AiError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockAiClient {
    pub fn new(responses: Vec<Result<String, AiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        self.calls.lock().push(messages);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::new("MockAiClient: no more responses")))
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}
