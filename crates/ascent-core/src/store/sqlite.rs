//! SQLite-backed record store.
//!
//! The reference on-disk implementation of [`RecordStore`]: a single
//! `records` table of (key, value) pairs holding JSON values. Lives at
//! `~/.config/ascent/ascent.db`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::{data_dir, RecordStore};
use crate::error::StoreError;

/// SQLite key-value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at `~/.config/ascent/ascent.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()?.join("ascent.db");
        Self::open_at(&path)
    }

    /// Open the store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryFailed("connection mutex poisoned".into()))
    }
}

impl RecordStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM records WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM records WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        // Escape LIKE wildcards so a literal prefix match is performed.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("{escaped}%");
        let mut stmt =
            conn.prepare("SELECT key FROM records WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key")?;
        let keys = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_in_memory() {
        let store = SqliteStore::open_memory().unwrap();
        store.set("challenge:abc", "{\"id\":\"abc\"}").unwrap();
        assert_eq!(
            store.get("challenge:abc").unwrap(),
            Some("{\"id\":\"abc\"}".to_string())
        );

        store.set("challenge:abc", "{\"id\":\"abc2\"}").unwrap();
        assert_eq!(
            store.get("challenge:abc").unwrap(),
            Some("{\"id\":\"abc2\"}".to_string())
        );

        store.remove("challenge:abc").unwrap();
        assert_eq!(store.get("challenge:abc").unwrap(), None);
    }

    #[test]
    fn test_prefix_listing() {
        let store = SqliteStore::open_memory().unwrap();
        store.set("snapshot:c1:2025-03-01", "{}").unwrap();
        store.set("snapshot:c1:2025-03-02", "{}").unwrap();
        store.set("snapshot:c2:2025-03-01", "{}").unwrap();

        let keys = store.keys_with_prefix("snapshot:c1:").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.starts_with("snapshot:c1:")));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ascent.db");
        {
            let store = SqliteStore::open_at(&path).unwrap();
            store.set("k", "v").unwrap();
        }
        // Reopen and read back
        let store = SqliteStore::open_at(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
    }
}
