//! Telemetry database operations - turn_records, execution_spans

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;
use serde_json::Value;

use super::super::Database;
use crate::telemetry::recorder::{TurnRecord, TurnStatus};
use crate::telemetry::span::{Span, SpanStatus, SpanType};

impl Database {
    // ============================================
    // Turn record operations
    // ============================================

    pub fn upsert_turn_record(&self, record: &TurnRecord) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO turn_records
                (turn_id, app_id, session_id, input, output, status, error, artifact,
                 started_at, completed_at, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(turn_id) DO UPDATE SET
                output = excluded.output,
                status = excluded.status,
                error = excluded.error,
                artifact = excluded.artifact,
                completed_at = excluded.completed_at,
                duration_ms = excluded.duration_ms",
            rusqlite::params![
                record.turn_id,
                record.app_id,
                record.session_id,
                record.input,
                record.output,
                record.status.as_str(),
                record.error,
                record.artifact,
                record.started_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
                record.duration_ms.map(|d| d as i64),
            ],
        )?;
        Ok(())
    }

    pub fn get_turn_record(&self, turn_id: &str) -> SqliteResult<Option<TurnRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT turn_id, app_id, session_id, input, output, status, error, artifact,
                    started_at, completed_at, duration_ms
             FROM turn_records WHERE turn_id = ?1",
        )?;
        let mut rows = stmt.query_map([turn_id], |row| Self::row_to_turn_record(row))?;
        rows.next().transpose()
    }

    pub fn list_turn_records(&self, limit: usize) -> SqliteResult<Vec<TurnRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT turn_id, app_id, session_id, input, output, status, error, artifact,
                    started_at, completed_at, duration_ms
             FROM turn_records ORDER BY started_at DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map([limit as i64], |row| Self::row_to_turn_record(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    pub fn prune_turn_records_before(&self, before: &str) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM turn_records WHERE started_at < ?1", [before])
    }

    fn row_to_turn_record(row: &rusqlite::Row) -> rusqlite::Result<TurnRecord> {
        let status_str: String = row.get(5)?;
        let started_at_str: String = row.get(8)?;
        let completed_at_str: Option<String> = row.get(9)?;

        Ok(TurnRecord {
            turn_id: row.get(0)?,
            app_id: row.get(1)?,
            session_id: row.get(2)?,
            input: row.get(3)?,
            output: row.get(4)?,
            status: TurnStatus::from_str(&status_str),
            error: row.get(6)?,
            artifact: row.get(7)?,
            started_at: parse_timestamp(&started_at_str).unwrap_or_else(Utc::now),
            completed_at: completed_at_str.as_deref().and_then(parse_timestamp),
            duration_ms: row.get::<_, Option<i64>>(10)?.map(|d| d.max(0) as u64),
        })
    }

    // ============================================
    // Span operations
    // ============================================

    pub fn insert_span(&self, span: &Span) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO execution_spans
                (span_id, sequence_id, turn_id, session_id, parent_span_id,
                 span_type, name, status, started_at, completed_at, duration_ms, attributes, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                span.span_id,
                span.sequence_id as i64,
                span.turn_id,
                span.session_id,
                span.parent_span_id,
                span.span_type.as_str(),
                span.name,
                span.status.as_str(),
                span.started_at.to_rfc3339(),
                span.completed_at.map(|t| t.to_rfc3339()),
                span.duration_ms.map(|d| d as i64),
                serde_json::to_string(&span.attributes).unwrap_or_default(),
                span.error,
            ],
        )?;
        Ok(())
    }

    pub fn get_spans_by_turn(&self, turn_id: &str) -> SqliteResult<Vec<Span>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT span_id, sequence_id, turn_id, session_id, parent_span_id,
                    span_type, name, status, started_at, completed_at, duration_ms, attributes, error
             FROM execution_spans WHERE turn_id = ?1 ORDER BY sequence_id",
        )?;

        let spans = stmt
            .query_map([turn_id], |row| Self::row_to_span(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(spans)
    }

    pub fn prune_spans_before(&self, before: &str) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM execution_spans WHERE started_at < ?1", [before])
    }

    fn row_to_span(row: &rusqlite::Row) -> rusqlite::Result<Span> {
        let span_type_str: String = row.get(5)?;
        let status_str: String = row.get(7)?;
        let started_at_str: String = row.get(8)?;
        let completed_at_str: Option<String> = row.get(9)?;
        let attributes_str: String = row.get(11)?;

        Ok(Span {
            span_id: row.get(0)?,
            sequence_id: row.get::<_, i64>(1)?.max(0) as u64,
            turn_id: row.get(2)?,
            session_id: row.get(3)?,
            parent_span_id: row.get(4)?,
            span_type: SpanType::from_str(&span_type_str).unwrap_or(SpanType::LlmCall),
            name: row.get(6)?,
            status: SpanStatus::from_str(&status_str),
            started_at: parse_timestamp(&started_at_str).unwrap_or_else(Utc::now),
            completed_at: completed_at_str.as_deref().and_then(parse_timestamp),
            duration_ms: row.get::<_, Option<i64>>(10)?.map(|d| d.max(0) as u64),
            attributes: serde_json::from_str(&attributes_str).unwrap_or(Value::Null),
            error: row.get(12)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
