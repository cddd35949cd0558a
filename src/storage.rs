//! Persistent key-value store backed by SQLite.
//!
//! Every durable piece of state (cache entries, the seeded local dictionary,
//! the activation flag) lives here as a JSON-encoded value under a string
//! key. Only the background context holds a handle; page contexts reach the
//! store through message round-trips.

use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

/// Storage failure, surfaced to callers as a lookup-level error.
#[derive(Debug)]
pub enum StorageError {
    Open(String),
    Query(String),
    Encode(String),
    Decode(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Open(e) => write!(f, "storage open failed: {e}"),
            StorageError::Query(e) => write!(f, "storage query failed: {e}"),
            StorageError::Encode(e) => write!(f, "storage encode failed: {e}"),
            StorageError::Decode(e) => write!(f, "storage decode failed: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// SQLite-backed key-value store.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path).map_err(|e| StorageError::Open(e.to_string()))?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StorageError::Open(e.to_string()))?;

        let storage = Self::init_schema(conn)?;
        info!(path = %db_path.display(), "storage opened");
        Ok(storage)
    }

    /// Open an ephemeral in-memory store. Useful for tests and throwaway
    /// sessions; nothing survives the process.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open(e.to_string()))?;
        Self::init_schema(conn)
    }

    fn init_schema(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| StorageError::Open(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read and decode the value under `key`. Returns None when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match raw {
            Some(text) => {
                let value =
                    serde_json::from_str(&text).map_err(|e| StorageError::Decode(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Encode `value` and write it under `key`, replacing any previous value.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let text = serde_json::to_string(value).map_err(|e| StorageError::Encode(e.to_string()))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, text],
        )
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    /// Delete the value under `key`. Deleting an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    /// Whether any value is stored under `key`.
    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let hit: Option<i64> = conn
            .query_row("SELECT 1 FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(hit.is_some())
    }
}
