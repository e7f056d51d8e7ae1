//! Session persistence
//!
//! One row per session holding its JSON snapshot, plus the session's
//! conversation log. The snapshot is authoritative; the log is reloaded for
//! display only.

mod schema;

pub use schema::*;

use crate::conversation::{Message, Role, Widget};
use crate::session::Session;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe store handle
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Session Operations ====================

    /// Insert a fresh session row
    pub fn create_session(&self, id: &str, session: &Session) -> StoreResult<SessionRecord> {
        let conn = self.conn();
        let now = Utc::now();
        let snapshot = serde_json::to_string(session)?;

        conn.execute(
            "INSERT INTO sessions (id, snapshot, step, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, snapshot, session.step.as_str(), now.to_rfc3339()],
        )?;

        Ok(SessionRecord {
            id: id.to_string(),
            session: session.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrite the snapshot of an existing session
    pub fn save_session(&self, id: &str, session: &Session) -> StoreResult<()> {
        let conn = self.conn();
        let now = Utc::now();
        let snapshot = serde_json::to_string(session)?;

        let updated = conn.execute(
            "UPDATE sessions SET snapshot = ?1, step = ?2, updated_at = ?3 WHERE id = ?4",
            params![snapshot, session.step.as_str(), now.to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn load_session(&self, id: &str) -> StoreResult<SessionRecord> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, snapshot, created_at, updated_at FROM sessions WHERE id = ?1",
                params![id],
                parse_session_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        row.into_record()
    }

    /// Most recently touched session, if any
    pub fn latest_session(&self) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, snapshot, created_at, updated_at FROM sessions
             ORDER BY updated_at DESC LIMIT 1",
            [],
            parse_session_row,
        )
        .optional()?
        .map(SessionRow::into_record)
        .transpose()
    }

    /// Clear calls that were in flight when the previous process exited.
    /// Returns the number of sessions repaired.
    pub fn clear_pending_calls(&self) -> StoreResult<usize> {
        let conn = self.conn();
        let now = Utc::now();

        let mut stmt = conn.prepare(
            "SELECT id, snapshot FROM sessions WHERE json_extract(snapshot, '$.pending') IS NOT NULL",
        )?;
        let stuck: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        for (id, snapshot) in &stuck {
            let session: Session = serde_json::from_str(snapshot)?;
            let repaired = serde_json::to_string(&session.restored())?;
            conn.execute(
                "UPDATE sessions SET snapshot = ?1, updated_at = ?2 WHERE id = ?3",
                params![repaired, now.to_rfc3339(), id],
            )?;
            tracing::info!(session_id = %id, "Cleared call interrupted by restart");
        }
        Ok(stuck.len())
    }

    // ==================== Message Operations ====================

    pub fn append_message(&self, session_id: &str, message: &Message) -> StoreResult<()> {
        let conn = self.conn();
        let widget = message.widget.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO messages (session_id, sequence_id, role, content, widget, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                i64::try_from(message.id).unwrap_or(i64::MAX),
                message.role.to_string(),
                message.content,
                widget,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The whole log of a session, oldest first
    pub fn messages(&self, session_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT sequence_id, role, content, widget, created_at
             FROM messages WHERE session_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![session_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

struct SessionRow {
    id: String,
    snapshot: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn into_record(self) -> StoreResult<SessionRecord> {
        Ok(SessionRecord {
            session: serde_json::from_str(&self.snapshot)?,
            id: self.id,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

fn parse_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        snapshot: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Parse a message row. A widget that no longer decodes is dropped rather
/// than failing the whole log.
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let sequence_id: i64 = row.get(0)?;
    let widget = match row.get::<_, Option<String>>(3)? {
        Some(raw) => match serde_json::from_str::<Widget>(&raw) {
            Ok(widget) => Some(widget),
            Err(e) => {
                tracing::warn!(sequence_id, error = %e, "Dropping widget that no longer decodes");
                None
            }
        },
        None => None,
    };

    Ok(Message {
        id: u64::try_from(sequence_id).unwrap_or_default(),
        role: parse_role(sequence_id, &row.get::<_, String>(1)?),
        content: row.get(2)?,
        timestamp: parse_datetime(&row.get::<_, String>(4)?),
        widget,
    })
}

fn parse_role(sequence_id: i64, s: &str) -> Role {
    match s {
        "user" => Role::User,
        "widget" => Role::Widget,
        "system" => Role::System,
        other => {
            tracing::warn!(sequence_id, role = other, "Unknown message role, showing as system");
            Role::System
        }
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
