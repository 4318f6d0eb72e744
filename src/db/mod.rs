//! Storage backends
//!
//! ## Architecture
//!
//! - SQLite holds accounts, roles, the student/lecturer directory and the
//!   achievement reference rows (workflow status)
//! - MongoDB holds achievement detail documents (content, attachments)
//!
//! ## Tables
//!
//! - `roles`, `permissions`, `role_permissions` - authorization
//! - `users`, `students`, `lecturers` - identity directory
//! - `achievement_references` - one row per achievement, status of record

pub mod details;
pub mod directory;
pub mod mongo;
pub mod references;
pub mod schema;
pub mod schemas;
pub mod seed;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::types::{AccoladeError, Result};

pub use details::MongoDetailStore;
pub use directory::{NewUser, SqliteDirectory};
pub use mongo::{MongoClient, MongoCollection};
pub use references::SqliteReferenceStore;

/// SQLite database shared by the reference store and the directory
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open or create the database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        info!("Opening SQLite database at {}", path);

        let conn = Connection::open(path)
            .map_err(|e| AccoladeError::Config(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent readers while a transition writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing and dev mode)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| AccoladeError::Config(format!("Failed to open in-memory SQLite: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(schema::init_schema)?;

        Ok(db)
    }

    /// Run `f` with the connection locked
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AccoladeError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AccoladeError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` on the blocking pool so async callers (and their timeouts)
    /// are never stalled on SQLite I/O.
    pub async fn call<F, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || db.with_conn_mut(f)).await?
    }
}

/// Timestamps are stored as RFC 3339 text with microsecond precision.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::model::now_micros;

    #[test]
    fn test_open_in_memory_initializes_schema() {
        let db = SqliteDb::open(":memory:").unwrap();
        let tables: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='achievement_references'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accolade.db");
        let path = path.to_str().unwrap();

        drop(SqliteDb::open(path).unwrap());
        // Reopening an initialized file must not recreate tables
        assert!(SqliteDb::open(path).is_ok());
    }

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let now = now_micros();
        let text = format_ts(&now);
        assert_eq!(parse_ts(0, &text).unwrap(), now);
    }

    #[tokio::test]
    async fn test_call_runs_on_blocking_pool() {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let n: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT 41 + 1", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(n, 42);
    }
}
