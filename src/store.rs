use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

/// Preference key holding the last city the user picked by hand.
pub const SELECTED_CITY_KEY: &str = "selectedCity";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> AppResult<()>;
}

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(database_file);

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(&path, flags)?;
        configure(&connection)?;
        run_migrations(&connection)?;
        info!(
            target: "preference_store",
            path = %path.display(),
            "preference store opened"
        );

        Ok(Self {
            db: Arc::new(Mutex::new(connection)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn configure(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );
        "#,
    )?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.db.lock();
        conn.query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(AppError::from)
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        {
            let conn = self.db.lock();
            conn.execute(
                "INSERT INTO preferences (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                (key, value, Utc::now().to_rfc3339()),
            )?;
        }
        debug!(target: "preference_store", key, "preference written");
        Ok(())
    }
}

/// Process-local store for tests and sessions that should not touch disk.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.entries.lock().insert(key.to_string(), value.to_string());
        store
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteStore::open(dir.path(), "prefs.db").unwrap();
            assert_eq!(store.get(SELECTED_CITY_KEY).await.unwrap(), None);
            store.set(SELECTED_CITY_KEY, "Scottsdale").await.unwrap();
            store.set(SELECTED_CITY_KEY, "San Francisco").await.unwrap();
        }

        let reopened = SqliteStore::open(dir.path(), "prefs.db").unwrap();
        assert!(reopened.path().ends_with("prefs.db"));
        assert_eq!(
            reopened.get(SELECTED_CITY_KEY).await.unwrap().as_deref(),
            Some("San Francisco")
        );
    }

    #[tokio::test]
    async fn sqlite_store_stamps_updates() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path(), "stamp.db").unwrap();
        store.set("other", "value").await.unwrap();

        let stamp: String = store
            .db
            .lock()
            .query_row(
                "SELECT updated_at FROM preferences WHERE key = 'other'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[tokio::test]
    async fn memory_store_clones_share_entries() {
        let store = MemoryStore::with_entry(SELECTED_CITY_KEY, "Los Angeles");
        let clone = store.clone();
        clone.set(SELECTED_CITY_KEY, "Scottsdale").await.unwrap();
        assert_eq!(
            store.get(SELECTED_CITY_KEY).await.unwrap().as_deref(),
            Some("Scottsdale")
        );
    }
}
