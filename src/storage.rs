// Key-value storage backends
//
// The chunked persistence engine only needs get/set/remove over string
// keys and values. Each backend may enforce a per-entry size ceiling, the
// way browser storage does, so oversized slots fail individually.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{JournalError, JournalResult};

/// Storage medium contract
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> JournalResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> JournalResult<()>;
    fn remove(&self, key: &str) -> JournalResult<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> JournalResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> JournalResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> JournalResult<()> {
        (**self).remove(key)
    }
}

fn check_quota(key: &str, value: &str, limit: Option<usize>) -> JournalResult<()> {
    match limit {
        Some(limit) if value.len() > limit => Err(JournalError::write(
            key,
            format!("quota exceeded ({} > {} bytes)", value.len(), limit),
        )),
        _ => Ok(()),
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    max_entry_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values longer than `max_entry_bytes`
    pub fn with_quota(max_entry_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entry_bytes: Some(max_entry_bytes),
        }
    }

    fn lock(&self, key: &str) -> JournalResult<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| JournalError::read(key, "memory store lock poisoned"))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> JournalResult<Option<String>> {
        Ok(self.lock(key)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> JournalResult<()> {
        check_quota(key, value, self.max_entry_bytes)?;
        self.lock(key)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> JournalResult<()> {
        self.lock(key)?.remove(key);
        Ok(())
    }
}

// =============================================================================
// SQLite backend
// =============================================================================

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    max_entry_bytes: Option<usize>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> JournalResult<Self> {
        let db_path = db_path.as_ref();
        let db_label = db_path.display().to_string();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| JournalError::write(&db_label, e))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| JournalError::read(&db_label, e))?;

        // WAL keeps readers unblocked while a save is in flight
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| JournalError::write(&db_label, e))?;

        let store = Self::from_connection(conn)?;
        info!("SQLite key-value store opened: {}", db_label);
        Ok(store)
    }

    pub fn open_in_memory() -> JournalResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| JournalError::read(":memory:", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> JournalResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entry_bytes: None,
        };
        store.create_tables()?;
        Ok(store)
    }

    pub fn with_quota(mut self, max_entry_bytes: Option<usize>) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    fn lock(&self, key: &str) -> JournalResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| JournalError::read(key, "sqlite connection lock poisoned"))
    }

    fn create_tables(&self) -> JournalResult<()> {
        let conn = self.lock("kv")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .map_err(|e| JournalError::write("kv", e))?;

        debug!("Key-value schema created/verified");
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> JournalResult<Option<String>> {
        let conn = self.lock(key)?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| JournalError::read(key, e))
    }

    fn set(&self, key: &str, value: &str) -> JournalResult<()> {
        check_quota(key, value, self.max_entry_bytes)?;
        let conn = self.lock(key)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)",
            params![key, value],
        )
        .map_err(|e| JournalError::write(key, e))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> JournalResult<()> {
        let conn = self.lock(key)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| JournalError::write(key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        // removing an absent key is fine
        store.remove("a").unwrap();
    }

    #[test]
    fn test_memory_store_roundtrip() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_roundtrip() {
        exercise(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_quota_rejects_oversized_entries() {
        let store = MemoryStore::with_quota(4);
        store.set("small", "abcd").unwrap();
        let err = store.set("big", "abcde").unwrap_err();
        assert!(matches!(err, JournalError::StorageWrite { ref key, .. } if key == "big"));
        assert_eq!(store.keys(), vec!["small".to_string()]);

        let sqlite = SqliteStore::open_in_memory().unwrap().with_quota(Some(2));
        assert!(sqlite.set("k", "xyz").is_err());
        assert_eq!(sqlite.get("k").unwrap(), None);
    }

    #[test]
    fn test_sqlite_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("trade-journal-kv-{}", std::process::id()));
        let path = dir.join("nested").join("journal.db");
        let _ = std::fs::remove_dir_all(&dir);

        {
            let store = SqliteStore::new(&path).unwrap();
            store.set("tradewzrd_trades_count", "1").unwrap();
        }
        let reopened = SqliteStore::new(&path).unwrap();
        assert_eq!(reopened.get("tradewzrd_trades_count").unwrap().as_deref(), Some("1"));

        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
