//! Key/value persistence backends.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::{migrations, StoreResult};

/// Key holding the logged-in user as JSON.
pub const LOGGED_IN_USER_KEY: &str = "loggedInUser";

/// Key holding the notification collection as a JSON array, in stored order.
pub const NOTIFICATIONS_KEY: &str = "notifications";

/// Trait for key/value persistence backends.
pub trait KeyValueStore: Send {
    /// Retrieve a value
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete a value
    fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// SQLite-backed store (`kv_store` table).
pub struct SqliteKeyValueStore {
    conn: Connection,
}

impl SqliteKeyValueStore {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        migrations::run_migrations(&conn)?;

        debug!(path = %path.display(), "Opened notification database");
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(count > 0)
    }
}

/// In-memory store. Clones share the same map, so a test can reopen a
/// service over the "same disk".
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn KeyValueStore) {
        assert!(store.get(NOTIFICATIONS_KEY).unwrap().is_none());

        store.set(NOTIFICATIONS_KEY, "[]").unwrap();
        assert_eq!(store.get(NOTIFICATIONS_KEY).unwrap().as_deref(), Some("[]"));

        store.set(NOTIFICATIONS_KEY, r#"[{"id":"n1"}]"#).unwrap();
        assert_eq!(
            store.get(NOTIFICATIONS_KEY).unwrap().as_deref(),
            Some(r#"[{"id":"n1"}]"#)
        );

        assert!(store.delete(NOTIFICATIONS_KEY).unwrap());
        assert!(!store.delete(NOTIFICATIONS_KEY).unwrap());
        assert!(store.get(NOTIFICATIONS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_in_memory_crud() {
        exercise(&SqliteKeyValueStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_memory_crud() {
        exercise(&MemoryKeyValueStore::new());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("notifications.sqlite");

        {
            let store = SqliteKeyValueStore::open(&path).unwrap();
            store.set(LOGGED_IN_USER_KEY, r#"{"id":"u1"}"#).unwrap();
        }

        let store = SqliteKeyValueStore::open(&path).unwrap();
        assert_eq!(
            store.get(LOGGED_IN_USER_KEY).unwrap().as_deref(),
            Some(r#"{"id":"u1"}"#)
        );
    }

    #[test]
    fn test_memory_clones_share_entries() {
        let a = MemoryKeyValueStore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
    }
}
