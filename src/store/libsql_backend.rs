//! libSQL backend: durable sessions and the submission ledger.
//!
//! Supports local file and in-memory databases.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::dispatch::Submission;
use crate::error::StoreError;
use crate::session::store::idle_window;
use crate::session::{Session, SessionStore};
use crate::store::migrations;

/// Answer fields written to the ledger, in column order.
pub const LEDGER_FIELDS: [&str; 12] = [
    "residence",
    "satisfaction",
    "property_type",
    "location",
    "budget",
    "search_status",
    "mortgage",
    "purchase_time",
    "name",
    "contact_method",
    "contact_time",
    "phone",
];

/// A row read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: String,
    pub submitted_at: DateTime<Utc>,
    pub session_id: String,
    pub answers: HashMap<String, String>,
}

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Append a submission to the ledger.
    pub async fn record_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut values = vec![
            libsql::Value::Text(submission.id.to_string()),
            libsql::Value::Text(timestamp(submission.submitted_at)),
            libsql::Value::Text(submission.session_id.clone()),
        ];
        values.extend(LEDGER_FIELDS.iter().map(|f| opt_text(submission.answer(f))));

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO submissions (id, submitted_at, session_id, {}) VALUES ({})",
            LEDGER_FIELDS.join(", "),
            placeholders.join(", ")
        );

        self.conn()
            .execute(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| StoreError::Query(format!("record_submission: {e}")))?;

        debug!(submission = %submission.id, session = %submission.session_id, "Ledger row written");
        Ok(())
    }

    /// Ledger rows for one session, oldest first.
    pub async fn ledger_entries(&self, session_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT id, submitted_at, session_id, {} FROM submissions WHERE session_id = ?1 ORDER BY submitted_at",
            LEDGER_FIELDS.join(", ")
        );
        let mut rows = self
            .conn()
            .query(&sql, params![session_id])
            .await
            .map_err(|e| StoreError::Query(format!("ledger_entries: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("ledger_entries: {e}")))?
        {
            let entry = row_to_entry(&row)
                .map_err(|e| StoreError::Query(format!("ledger row parse: {e}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Column order: 0:id, 1:submitted_at, 2:session_id, then `LEDGER_FIELDS`.
fn row_to_entry(row: &libsql::Row) -> Result<LedgerEntry, libsql::Error> {
    let id: String = row.get(0)?;
    let submitted_at: String = row.get(1)?;
    let session_id: String = row.get(2)?;

    let answers = LEDGER_FIELDS
        .iter()
        .enumerate()
        .filter_map(|(i, field)| {
            row.get::<String>(i as i32 + 3)
                .ok()
                .map(|value| (field.to_string(), value))
        })
        .collect();

    Ok(LedgerEntry {
        id,
        submitted_at: parse_datetime(&submitted_at),
        session_id,
        answers,
    })
}

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let state: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_session row parse: {e}")))?;
                let session = serde_json::from_str(&state)
                    .map_err(|e| StoreError::Serialization(format!("session {session_id}: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_session: {e}"))),
        }
    }

    async fn put(&self, session: &Session) -> Result<(), StoreError> {
        let state = serde_json::to_string(session).map_err(|e| {
            StoreError::Serialization(format!("session {}: {e}", session.session_id))
        })?;
        self.conn()
            .execute(
                "INSERT INTO sessions (session_id, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                params![session.session_id.clone(), state, timestamp(session.updated_at)],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put_session: {e}")))?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn()
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])
            .await
            .map_err(|e| StoreError::Query(format!("clear_session: {e}")))?;
        Ok(removed > 0)
    }

    async fn idle_sessions(&self, max_idle: Duration) -> Result<Vec<String>, StoreError> {
        let cutoff = timestamp(Utc::now() - idle_window(max_idle)?);

        let mut rows = self
            .conn()
            .query(
                "SELECT session_id FROM sessions WHERE updated_at < ?1",
                params![cutoff],
            )
            .await
            .map_err(|e| StoreError::Query(format!("idle_sessions: {e}")))?;
        let mut idle = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(id) = row.get::<String>(0) {
                idle.push(id);
            }
        }
        Ok(idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Section, StepId};
    use crate::session::{SessionLocks, sweep_idle};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_session(id: &str) -> Session {
        let mut session = Session::new(id, StepId("residence"));
        session.advance("residence", "Снимаю квартиру".into(), StepId("satisfaction"));
        session
    }

    // ── Sessions ────────────────────────────────────────────────────

    #[tokio::test]
    async fn put_and_get_session() {
        let db = test_db().await;
        let mut session = make_session("telegram:1");
        session.editing = Some(Section::Readiness);

        db.put(&session).await.unwrap();
        let fetched = db.get("telegram:1").await.unwrap().unwrap();
        assert_eq!(fetched, session);
    }

    #[tokio::test]
    async fn get_missing_session() {
        let db = test_db().await;
        assert!(db.get("telegram:404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites() {
        let db = test_db().await;
        let mut session = make_session("telegram:1");
        db.put(&session).await.unwrap();

        session.advance("satisfaction", "Да, всё устраивает".into(), StepId("property_type"));
        db.put(&session).await.unwrap();

        let fetched = db.get("telegram:1").await.unwrap().unwrap();
        assert_eq!(fetched.current, "property_type");
        assert_eq!(fetched.history.len(), 2);
    }

    #[tokio::test]
    async fn clear_reports_existence() {
        let db = test_db().await;
        db.put(&make_session("telegram:1")).await.unwrap();
        assert!(db.clear("telegram:1").await.unwrap());
        assert!(!db.clear("telegram:1").await.unwrap());
        assert!(db.get("telegram:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_sweep_removes_only_stale() {
        let db = test_db().await;
        let mut stale = make_session("telegram:old");
        stale.updated_at = Utc::now() - chrono::Duration::hours(48);
        db.put(&stale).await.unwrap();
        db.put(&make_session("telegram:new")).await.unwrap();

        let max_idle = Duration::from_secs(24 * 3600);
        let idle = db.idle_sessions(max_idle).await.unwrap();
        assert_eq!(idle, vec!["telegram:old".to_string()]);
        assert!(db.get("telegram:old").await.unwrap().is_some());

        let locks = SessionLocks::new();
        let expired = sweep_idle(&db, &locks, max_idle).await.unwrap();
        assert_eq!(expired, vec!["telegram:old".to_string()]);
        assert!(db.get("telegram:old").await.unwrap().is_none());
        assert!(db.get("telegram:new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("intake.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.put(&make_session("telegram:1")).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let session = db.get("telegram:1").await.unwrap().unwrap();
        assert_eq!(session.answer("residence"), Some("Снимаю квартиру"));
    }

    // ── Ledger ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn ledger_keeps_known_fields() {
        let db = test_db().await;
        let answers = HashMap::from([
            ("name".to_string(), "Анна".to_string()),
            ("phone".to_string(), "79123456789".to_string()),
            ("unrelated".to_string(), "dropped".to_string()),
        ]);
        let submission = Submission::application("telegram:7", answers);
        db.record_submission(&submission).await.unwrap();

        let entries = db.ledger_entries("telegram:7").await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, submission.id.to_string());
        assert_eq!(entry.answers.get("name").map(String::as_str), Some("Анна"));
        assert_eq!(entry.answers.get("phone").map(String::as_str), Some("79123456789"));
        assert!(!entry.answers.contains_key("unrelated"));
        assert!(!entry.answers.contains_key("budget"));
        assert_eq!(
            entry.submitted_at.timestamp_micros(),
            submission.submitted_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn ledger_is_append_only() {
        let db = test_db().await;
        for _ in 0..2 {
            db.record_submission(&Submission::application("telegram:7", HashMap::new()))
                .await
                .unwrap();
        }
        assert_eq!(db.ledger_entries("telegram:7").await.unwrap().len(), 2);
        assert!(db.ledger_entries("telegram:8").await.unwrap().is_empty());
        let first = &db.ledger_entries("telegram:7").await.unwrap()[0];
        assert!(uuid::Uuid::parse_str(&first.id).is_ok());
    }
}
