//! Recording scopes around runner invocations.
//!
//! A `RecordingScope` is opened right before the runner is called and is
//! closed on every exit path: explicitly via `succeed()` / `fail()`, or by
//! `Drop` when the caller bails out early. Closing persists the turn record
//! and every span collected during the turn. Recording never changes what
//! the turn returns; persistence failures are only logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::span::{SpanCollector, SpanGuard, SpanType};
use super::store::TelemetryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Running,
    Succeeded,
    Failed,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Running => "running",
            TurnStatus::Succeeded => "succeeded",
            TurnStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "succeeded" => TurnStatus::Succeeded,
            "failed" => TurnStatus::Failed,
            _ => TurnStatus::Running,
        }
    }
}

/// One recorded runner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: String,
    pub app_id: String,
    pub session_id: String,
    /// The composed instruction handed to the runner
    pub input: String,
    pub output: Option<String>,
    pub status: TurnStatus,
    pub error: Option<String>,
    pub artifact: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

pub struct Recorder {
    app_id: String,
    store: Arc<TelemetryStore>,
    open_scopes: AtomicUsize,
}

impl Recorder {
    pub fn new(app_id: impl Into<String>, store: Arc<TelemetryStore>) -> Self {
        Self {
            app_id: app_id.into(),
            store,
            open_scopes: AtomicUsize::new(0),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    /// Number of scopes opened and not yet closed.
    pub fn open_scopes(&self) -> usize {
        self.open_scopes.load(Ordering::SeqCst)
    }

    /// Open a recording scope for one runner invocation.
    pub fn open(self: &Arc<Self>, turn_id: &str, session_id: &str, input: &str) -> RecordingScope {
        let collector = Arc::new(SpanCollector::new(turn_id.to_string(), session_id.to_string()));
        let mut root = collector.start_guarded(SpanType::Turn, self.app_id.clone());
        root.set_attribute("input_chars", json!(input.chars().count()));
        collector.set_root(root.span_id().to_string());

        self.open_scopes.fetch_add(1, Ordering::SeqCst);
        log::debug!("[TELEMETRY] Opened recording scope for turn {}", turn_id);

        RecordingScope {
            recorder: Arc::clone(self),
            collector,
            root: Some(root),
            record: TurnRecord {
                turn_id: turn_id.to_string(),
                app_id: self.app_id.clone(),
                session_id: session_id.to_string(),
                input: input.to_string(),
                output: None,
                status: TurnStatus::Running,
                error: None,
                artifact: None,
                started_at: Utc::now(),
                completed_at: None,
                duration_ms: None,
            },
            closed: false,
        }
    }
}

pub struct RecordingScope {
    recorder: Arc<Recorder>,
    collector: Arc<SpanCollector>,
    root: Option<SpanGuard>,
    record: TurnRecord,
    closed: bool,
}

impl RecordingScope {
    pub fn turn_id(&self) -> &str {
        &self.record.turn_id
    }

    /// Collector that nested spans (manager steps, delegations) report into.
    pub fn collector(&self) -> Arc<SpanCollector> {
        Arc::clone(&self.collector)
    }

    pub fn succeed(mut self, output: &str, artifact: Option<&str>) {
        self.record.output = Some(output.to_string());
        self.record.artifact = artifact.map(str::to_string);
        self.close(TurnStatus::Succeeded, None);
    }

    pub fn fail(mut self, error: &str) {
        self.close(TurnStatus::Failed, Some(error.to_string()));
    }

    fn close(&mut self, status: TurnStatus, error: Option<String>) {
        if self.closed {
            return;
        }
        self.closed = true;

        let now = Utc::now();
        self.record.status = status;
        self.record.error = error.clone();
        self.record.completed_at = Some(now);
        self.record.duration_ms = Some((now - self.record.started_at).num_milliseconds().max(0) as u64);

        if let Some(mut root) = self.root.take() {
            if let Some(artifact) = &self.record.artifact {
                root.set_attribute("artifact", json!(artifact));
            }
            match error {
                Some(e) => root.fail(e),
                None => root.succeed(),
            }
        }

        self.recorder.store.persist_turn(&self.record, &self.collector);
        self.recorder.open_scopes.fetch_sub(1, Ordering::SeqCst);
        log::debug!(
            "[TELEMETRY] Closed recording scope for turn {} ({})",
            self.record.turn_id,
            status.as_str()
        );
    }
}

impl Drop for RecordingScope {
    fn drop(&mut self) {
        if !self.closed {
            self.close(
                TurnStatus::Failed,
                Some("recording scope dropped before completion".to_string()),
            );
        }
    }
}
