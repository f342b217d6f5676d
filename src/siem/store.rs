//! Alert feed persistence. SQLite on disk for the engine, an in-memory
//! implementation for tests and ephemeral deployments.

use super::{AlertRecord, Severity, Stride};
use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Feed storage consumed by the aggregator. Implementations must be safe
/// to share across the async runtime.
pub trait AlertStore: Send + Sync {
    fn insert(&self, record: &AlertRecord) -> Result<()>;
    fn query_since(&self, session_id: &str, since: DateTime<Utc>) -> Result<Vec<AlertRecord>>;
}

pub struct SqliteAlertStore {
    conn: Mutex<Connection>,
}

impl SqliteAlertStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                session_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                stride TEXT NOT NULL,
                source TEXT,
                ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_session_ts ON alerts(session_id, ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Retention: delete alerts older than given timestamp.
    pub fn prune_before(&self, ts: DateTime<Utc>) -> Result<u64> {
        let n = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM alerts WHERE ts < ?1", params![ts.timestamp_millis()])?;
        Ok(n as u64)
    }
}

impl AlertStore for SqliteAlertStore {
    fn insert(&self, record: &AlertRecord) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO alerts (session_id, severity, stride, source, ts) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.session_id,
                record.severity.as_str(),
                record.stride.as_str(),
                record.source,
                record.ts.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn query_since(&self, session_id: &str, since: DateTime<Utc>) -> Result<Vec<AlertRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT severity, stride, source, ts FROM alerts WHERE session_id = ?1 AND ts >= ?2",
        )?;
        let rows = stmt.query_map(params![session_id, since.timestamp_millis()], |row| {
            let severity: String = row.get(0)?;
            let stride: String = row.get(1)?;
            let source: Option<String> = row.get(2)?;
            let ts: i64 = row.get(3)?;
            Ok(AlertRecord {
                session_id: session_id.to_string(),
                severity: Severity::parse_token(&severity),
                stride: Stride::parse_token(&stride),
                source,
                ts: Utc.timestamp_millis_opt(ts).single().unwrap_or_else(Utc::now),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// In-memory feed for tests; same semantics as the SQLite store.
#[derive(Default)]
pub struct MemoryAlertStore {
    records: Mutex<Vec<AlertRecord>>,
}

impl AlertStore for MemoryAlertStore {
    fn insert(&self, record: &AlertRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn query_since(&self, session_id: &str, since: DateTime<Utc>) -> Result<Vec<AlertRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.session_id == session_id && r.ts >= since)
            .cloned()
            .collect())
    }
}
