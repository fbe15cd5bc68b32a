//! SQLite-backed telemetry persistence with retention policy.

use chrono::{Duration, Utc};
use std::sync::Arc;

use super::recorder::TurnRecord;
use super::span::{Span, SpanCollector};
use crate::db::Database;

/// Retention policy for telemetry data.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// How long to keep turn records and their spans (in days)
    pub retention_days: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

pub struct TelemetryStore {
    db: Arc<Database>,
    retention: RetentionPolicy,
}

impl TelemetryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Persist a turn record and drain the collector's spans into the database.
    pub fn persist_turn(&self, record: &TurnRecord, collector: &SpanCollector) {
        if let Err(e) = self.db.upsert_turn_record(record) {
            log::error!("[TELEMETRY] Failed to persist turn {}: {}", record.turn_id, e);
        }

        let spans = collector.drain();
        if spans.is_empty() {
            return;
        }

        log::info!(
            "[TELEMETRY] Persisting {} spans for turn {}",
            spans.len(),
            collector.turn_id()
        );

        for span in &spans {
            if let Err(e) = self.db.insert_span(span) {
                log::error!("[TELEMETRY] Failed to persist span {}: {}", span.span_id, e);
            }
        }
    }

    pub fn turn_record(&self, turn_id: &str) -> Option<TurnRecord> {
        match self.db.get_turn_record(turn_id) {
            Ok(record) => record,
            Err(e) => {
                log::error!("[TELEMETRY] Failed to get turn record: {}", e);
                None
            }
        }
    }

    pub fn recent_records(&self, limit: usize) -> Vec<TurnRecord> {
        match self.db.list_turn_records(limit) {
            Ok(records) => records,
            Err(e) => {
                log::error!("[TELEMETRY] Failed to list turn records: {}", e);
                Vec::new()
            }
        }
    }

    pub fn turn_spans(&self, turn_id: &str) -> Vec<Span> {
        match self.db.get_spans_by_turn(turn_id) {
            Ok(spans) => spans,
            Err(e) => {
                log::error!("[TELEMETRY] Failed to get turn spans: {}", e);
                Vec::new()
            }
        }
    }

    /// Prune telemetry data older than the retention policy.
    pub fn prune(&self) {
        let cutoff = (Utc::now() - Duration::days(self.retention.retention_days as i64)).to_rfc3339();

        match self.db.prune_spans_before(&cutoff) {
            Ok(count) if count > 0 => log::info!("[TELEMETRY] Pruned {} old spans", count),
            Ok(_) => {}
            Err(e) => log::error!("[TELEMETRY] Failed to prune spans: {}", e),
        }

        match self.db.prune_turn_records_before(&cutoff) {
            Ok(count) if count > 0 => log::info!("[TELEMETRY] Pruned {} old turn records", count),
            Ok(_) => {}
            Err(e) => log::error!("[TELEMETRY] Failed to prune turn records: {}", e),
        }
    }
}
