use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;

/// Minimal durable key-value contract: string keys, string values, per-key
/// expiry. The conversation log (`conv:{id}`) and correspondent profiles
/// (`profile:{id}`) both live behind this trait.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// SQLite-backed [`KvStore`]. Expired rows are invisible to reads and
/// deleted lazily on the next access to their key.
pub struct SqliteKv {
    db: Mutex<Connection>,
}

impl SqliteKv {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        // Lazy cleanup: a stale row for this key is dropped before the read.
        db.execute(
            "DELETE FROM kv WHERE key = ?1 AND expires_at <= ?2",
            rusqlite::params![key, now],
        )?;
        let value: Option<String> = db
            .query_row(
                "SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2",
                rusqlite::params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap();
        let expires_at = (Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64)).to_rfc3339();
        db.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at",
            rusqlite::params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }
}
