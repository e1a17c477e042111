use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::db;
use crate::models::now_iso;
use crate::workspace::{KvStore, WorkspaceError};

/// Key-value store backed by the `kv` table of a SQLite file.
pub struct SqliteKvStore {
    db_path: PathBuf,
}

impl SqliteKvStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let db_path = db_path.into();
        db::init_db(&db_path)?;
        Ok(Self { db_path })
    }

    pub fn settings(&self) -> Result<HashMap<String, String>, WorkspaceError> {
        let conn = db::connect(&self.db_path)?;
        Ok(db::get_all_settings(&conn)?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), WorkspaceError> {
        let conn = db::connect(&self.db_path)?;
        db::set_setting(&conn, key, value, &now_iso())?;
        Ok(())
    }
}

// rusqlite is synchronous; queries run on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, WorkspaceError>
where
    F: FnOnce() -> Result<T, WorkspaceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkspaceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, WorkspaceError> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        blocking(move || {
            let conn = db::connect(&db_path)?;
            match db::kv_get(&conn, &key)? {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), WorkspaceError> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        blocking(move || {
            let conn = db::connect(&db_path)?;
            db::kv_set(&conn, &key, &value.to_string(), &now_iso())?;
            Ok(())
        })
        .await
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, WorkspaceError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), WorkspaceError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_kv_overwrites_and_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("assistant.sqlite");

        let store = SqliteKvStore::open(&path).unwrap();
        assert_eq!(store.get("summary:a.rs").await.unwrap(), None);

        store.set("summary:a.rs", json!("first")).await.unwrap();
        store.set("summary:a.rs", json!("second")).await.unwrap();
        store.set("analytics:token_usage", json!([{ "tokens": 3 }])).await.unwrap();

        let reopened = SqliteKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("summary:a.rs").await.unwrap(), Some(json!("second")));
        assert_eq!(
            reopened.get("analytics:token_usage").await.unwrap(),
            Some(json!([{ "tokens": 3 }]))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sqlite_kv_from_concurrent_tasks() {
        let temp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(SqliteKvStore::open(temp.path().join("kv.sqlite")).unwrap());

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set(&format!("summary:{}.rs", i), json!(i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        for i in 0..4 {
            assert_eq!(store.get(&format!("summary:{}.rs", i)).await.unwrap(), Some(json!(i)));
        }
    }

    #[test]
    fn test_sqlite_settings() {
        let temp = TempDir::new().unwrap();
        let store = SqliteKvStore::open(temp.path().join("s.sqlite")).unwrap();
        store.set_setting("model", "gpt-5-nano").unwrap();
        store.set_setting("model", "other").unwrap();
        let settings = store.settings().unwrap();
        assert_eq!(settings.get("model").map(String::as_str), Some("other"));
    }
}
