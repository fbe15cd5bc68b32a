//! Parsing of the per-step decisions agents reply with.
//!
//! The manager is asked to answer with one JSON object, either
//! `{"action": "delegate", "agent": "...", "task": "..."}` or
//! `{"action": "final_answer", "answer": "..."}`. Managed agents with tools
//! use `{"action": "tool", "tool": "...", "arguments": {...}}` instead of
//! delegating. Models wrap that object in prose or code fences often enough
//! that we search for it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

static FENCED_JSON: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerAction {
    Delegate { agent: String, task: String },
    FinalAnswer(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawAction {
    Delegate { agent: String, task: String },
    FinalAnswer { answer: String },
}

impl From<RawAction> for ManagerAction {
    fn from(raw: RawAction) -> Self {
        match raw {
            RawAction::Delegate { agent, task } => ManagerAction::Delegate { agent, task },
            RawAction::FinalAnswer { answer } => ManagerAction::FinalAnswer(answer),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    CallTool { tool: String, arguments: Value },
    FinalAnswer(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawAgentAction {
    Tool {
        tool: String,
        #[serde(default)]
        arguments: Value,
    },
    FinalAnswer {
        answer: String,
    },
}

impl From<RawAgentAction> for AgentAction {
    fn from(raw: RawAgentAction) -> Self {
        match raw {
            RawAgentAction::Tool { tool, arguments } => AgentAction::CallTool { tool, arguments },
            RawAgentAction::FinalAnswer { answer } => AgentAction::FinalAnswer(answer),
        }
    }
}

/// Parse a manager reply. A reply without a recognizable action is the final answer.
pub fn parse_action(reply: &str) -> ManagerAction {
    extract::<RawAction>(reply)
        .map(ManagerAction::from)
        .unwrap_or_else(|| ManagerAction::FinalAnswer(reply.trim().to_string()))
}

/// Parse a managed agent's reply, same fallback as [`parse_action`].
pub fn parse_agent_action(reply: &str) -> AgentAction {
    extract::<RawAgentAction>(reply)
        .map(AgentAction::from)
        .unwrap_or_else(|| AgentAction::FinalAnswer(reply.trim().to_string()))
}

/// The first fenced, then the first bare, JSON object that deserializes as `T`.
fn extract<T: DeserializeOwned>(reply: &str) -> Option<T> {
    if let Some(re) = FENCED_JSON.as_ref() {
        for caps in re.captures_iter(reply) {
            if let Some(parsed) = caps.get(1).and_then(|m| serde_json::from_str::<T>(m.as_str()).ok()) {
                return Some(parsed);
            }
        }
    }

    let mut rest = reply;
    while let Some(candidate) = first_json_object(rest) {
        if let Ok(parsed) = serde_json::from_str::<T>(candidate) {
            return Some(parsed);
        }
        // Skip past this object's opening brace and keep looking
        let offset = candidate.as_ptr() as usize - rest.as_ptr() as usize + 1;
        rest = &rest[offset..];
    }
    None
}

/// Find the first balanced `{...}` slice, honoring JSON string escapes.
fn first_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
