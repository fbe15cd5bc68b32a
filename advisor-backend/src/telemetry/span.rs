//! Span-based telemetry for structured turn traces.
//!
//! The turn itself, every manager step, delegation, tool call and feedback
//! score emits a `Span` with a monotonically increasing `sequence_id`, type,
//! status, timing and attributes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The kind of operation a span represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    /// A whole chat turn (root span of a recording scope)
    Turn,
    /// One decision round of the manager agent
    ManagerStep,
    /// A task handed to a managed sub-agent
    Delegation,
    /// A raw LLM generation call
    LlmCall,
    /// A tool invoked by a managed agent
    ToolCall,
    /// A judge's score for the turn's answer
    Feedback,
}

impl SpanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanType::Turn => "turn",
            SpanType::ManagerStep => "manager_step",
            SpanType::Delegation => "delegation",
            SpanType::LlmCall => "llm_call",
            SpanType::ToolCall => "tool_call",
            SpanType::Feedback => "feedback",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "turn" => Some(SpanType::Turn),
            "manager_step" => Some(SpanType::ManagerStep),
            "delegation" => Some(SpanType::Delegation),
            "llm_call" => Some(SpanType::LlmCall),
            "tool_call" => Some(SpanType::ToolCall),
            "feedback" => Some(SpanType::Feedback),
            _ => None,
        }
    }
}

/// The completion status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Succeeded,
    Failed,
}

impl SpanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SpanStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Running => "running",
            SpanStatus::Succeeded => "succeeded",
            SpanStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "succeeded" => SpanStatus::Succeeded,
            "failed" => SpanStatus::Failed,
            _ => SpanStatus::Running,
        }
    }
}

/// A structured execution span capturing a single operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    /// Monotonically increasing sequence within a turn
    pub sequence_id: u64,
    pub turn_id: String,
    pub session_id: String,
    pub parent_span_id: Option<String>,
    pub span_type: SpanType,
    /// Human-readable name (agent name, "manager", ...)
    pub name: String,
    pub status: SpanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub attributes: Value,
    pub error: Option<String>,
}

impl Span {
    /// Create a new running span.
    pub fn new(
        sequence_id: u64,
        turn_id: String,
        session_id: String,
        span_type: SpanType,
        name: String,
    ) -> Self {
        Self {
            span_id: uuid::Uuid::new_v4().to_string(),
            sequence_id,
            turn_id,
            session_id,
            parent_span_id: None,
            span_type,
            name,
            status: SpanStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            attributes: Value::Object(serde_json::Map::new()),
            error: None,
        }
    }

    /// Set or overwrite one attribute.
    pub fn set_attribute(&mut self, key: &str, value: Value) {
        if !self.attributes.is_object() {
            self.attributes = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.attributes.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }

    fn finish(&mut self, status: SpanStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }

    /// Mark the span as succeeded.
    pub fn succeed(&mut self) {
        self.finish(SpanStatus::Succeeded);
    }

    /// Mark the span as failed with an error message.
    pub fn fail(&mut self, error: String) {
        self.finish(SpanStatus::Failed);
        self.error = Some(error);
    }
}

/// Thread-safe accumulator for the spans of one turn.
#[derive(Debug)]
pub struct SpanCollector {
    sequence: AtomicU64,
    turn_id: String,
    session_id: String,
    /// Span new spans are parented to unless they name another parent
    root_span_id: Mutex<Option<String>>,
    spans: Mutex<Vec<Span>>,
}

impl SpanCollector {
    pub fn new(turn_id: String, session_id: String) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            turn_id,
            session_id,
            root_span_id: Mutex::new(None),
            spans: Mutex::new(Vec::new()),
        }
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_root(&self, span_id: String) {
        *self.root_span_id.lock() = Some(span_id);
    }

    /// Start a new span parented to the root span, if one is set.
    pub fn start_span(&self, span_type: SpanType, name: impl Into<String>) -> Span {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut span = Span::new(
            seq,
            self.turn_id.clone(),
            self.session_id.clone(),
            span_type,
            name.into(),
        );
        span.parent_span_id = self.root_span_id.lock().clone();
        span
    }

    /// Record a completed span.
    pub fn record(&self, span: Span) {
        self.spans.lock().push(span);
    }

    /// Start a span and return a guard that auto-completes it on drop.
    pub fn start_guarded(self: &Arc<Self>, span_type: SpanType, name: impl Into<String>) -> SpanGuard {
        let span = self.start_span(span_type, name);
        SpanGuard {
            collector: Arc::clone(self),
            span: Some(span),
        }
    }

    /// Drain all collected spans, returning them and clearing the internal buffer.
    pub fn drain(&self) -> Vec<Span> {
        std::mem::take(&mut *self.spans.lock())
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Span> {
        self.spans.lock().clone()
    }
}

/// RAII guard that completes a span when dropped.
///
/// A span dropped without an explicit `succeed()` / `fail()` is recorded as
/// failed: the only way to get there is an early return or a panic.
pub struct SpanGuard {
    collector: Arc<SpanCollector>,
    span: Option<Span>,
}

impl SpanGuard {
    pub fn span_id(&self) -> &str {
        self.span.as_ref().map(|s| s.span_id.as_str()).unwrap_or("")
    }

    pub fn set_attribute(&mut self, key: &str, value: Value) {
        if let Some(span) = self.span.as_mut() {
            span.set_attribute(key, value);
        }
    }

    pub fn succeed(mut self) {
        if let Some(mut span) = self.span.take() {
            span.succeed();
            self.collector.record(span);
        }
    }

    pub fn fail(mut self, error: String) {
        if let Some(mut span) = self.span.take() {
            span.fail(error);
            self.collector.record(span);
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            if !span.status.is_terminal() {
                span.fail("span dropped before completion".to_string());
            }
            self.collector.record(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collector() -> Arc<SpanCollector> {
        Arc::new(SpanCollector::new("turn-1".to_string(), "web".to_string()))
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let c = collector();
        let a = c.start_span(SpanType::ManagerStep, "manager");
        let b = c.start_span(SpanType::Delegation, "data_analyst");
        assert_eq!(a.sequence_id, 0);
        assert_eq!(b.sequence_id, 1);
        assert_eq!(b.turn_id, "turn-1");
    }

    #[test]
    fn test_spans_inherit_root_parent() {
        let c = collector();
        c.set_root("root".to_string());
        let span = c.start_span(SpanType::Delegation, "tax_advisor");
        assert_eq!(span.parent_span_id.as_deref(), Some("root"));
    }

    #[test]
    fn test_guard_records_on_explicit_completion() {
        let c = collector();
        let mut guard = c.start_guarded(SpanType::Delegation, "data_analyst");
        guard.set_attribute("task", json!("summarize"));
        guard.succeed();

        let spans = c.drain();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Succeeded);
        assert_eq!(spans[0].attributes["task"], "summarize");
        assert!(c.is_empty());
    }

    #[test]
    fn test_guard_dropped_early_is_failed() {
        let c = collector();
        {
            let _guard = c.start_guarded(SpanType::ManagerStep, "manager");
        }
        let spans = c.snapshot();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Failed);
        assert!(spans[0].duration_ms.is_some());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [SpanStatus::Running, SpanStatus::Succeeded, SpanStatus::Failed] {
            assert_eq!(SpanStatus::from_str(status.as_str()), status);
        }
        assert_eq!(SpanType::from_str("delegation"), Some(SpanType::Delegation));
        assert_eq!(SpanType::from_str(SpanType::Feedback.as_str()), Some(SpanType::Feedback));
    }
}
