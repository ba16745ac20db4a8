use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Well-known document keys.
pub mod keys {
    pub const PROFILE: &str = "profile";
    pub const SESSION_DATA: &str = "session_data";
    pub const SAVED_PROFILES: &str = "saved_profiles";
    pub const FIELD_MAPPINGS: &str = "field_mappings";
    pub const JOB_APPLICATIONS: &str = "job_applications";
    pub const EXPORT_HISTORY: &str = "export_history";
}

/// Key -> JSON document persistence.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

pub fn save<T: Serialize>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).with_context(|| format!("Failed to serialize '{}'", key))?;
    store.set(key, &value)
}

// --- SQLite ---

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "autofill") {
            Ok(proj_dirs.data_dir().join("autofill.db"))
        } else {
            Ok(PathBuf::from("autofill.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='documents'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Store not initialized. Run 'autofill init' first."));
        }
        Ok(())
    }

    /// When each document was last written, newest first.
    pub fn updated_at(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, updated_at FROM documents ORDER BY updated_at DESC, key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list documents")
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM documents WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read '{}'", key))?;
        match raw {
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .with_context(|| format!("Document '{}' is not valid JSON", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.conn
            .execute(
                "INSERT INTO documents (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, text],
            )
            .with_context(|| format!("Failed to write '{}'", key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM documents WHERE key = ?1", [key])
            .with_context(|| format!("Failed to remove '{}'", key))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM documents ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list document keys")
    }
}

// --- In memory ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RefCell<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.documents.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.documents.borrow_mut().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.documents.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.documents.borrow().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise(store: &dyn Store) {
        assert_eq!(store.get("profile").unwrap(), None);
        store.set("profile", &json!({"firstName": "Ada"})).unwrap();
        store.set("profile", &json!({"firstName": "Grace"})).unwrap();
        store.set("session_data", &json!({"profiles": []})).unwrap();
        assert_eq!(store.get("profile").unwrap(), Some(json!({"firstName": "Grace"})));
        assert_eq!(store.keys().unwrap(), ["profile", "session_data"]);
        store.remove("profile").unwrap();
        assert_eq!(store.get("profile").unwrap(), None);
        store.remove("never-written").unwrap();
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_in_memory() {
        exercise(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autofill.db");
        {
            let store = SqliteStore::open_at(&path).unwrap();
            assert!(store.ensure_initialized().is_err());
            store.init().unwrap();
            store.ensure_initialized().unwrap();
            store.set("export_history", &json!([{"type": "applications"}])).unwrap();
        }
        let store = SqliteStore::open_at(&path).unwrap();
        store.ensure_initialized().unwrap();
        assert_eq!(store.get("export_history").unwrap(), Some(json!([{"type": "applications"}])));
        assert_eq!(store.updated_at().unwrap().len(), 1);
    }

    #[test]
    fn test_save_serializes() {
        let store = MemoryStore::new();
        save(&store, "limits", &vec![1, 2, 3]).unwrap();
        assert_eq!(store.get("limits").unwrap(), Some(json!([1, 2, 3])));
    }
}
