use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub fn connect(db_path: &Path) -> Result<Connection, DbError> {
  if let Some(parent) = db_path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)?;
    }
  }
  let conn = Connection::open(db_path)?;
  Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<(), DbError> {
  let conn = connect(db_path)?;
  // Each statement uses IF NOT EXISTS, so re-running is harmless.
  let init_sql = include_str!("../migrations/001_init.sql");
  conn.execute_batch(init_sql)?;
  Ok(())
}

pub fn kv_get(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
  let value = conn.query_row(
    "SELECT value FROM kv WHERE key = ?1",
    [key],
    |r| r.get(0)
  ).optional()?;
  Ok(value)
}

pub fn kv_set(conn: &Connection, key: &str, value: &str, updated_at: &str) -> Result<(), DbError> {
  conn.execute(
    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    (key, value, updated_at)
  )?;
  Ok(())
}

pub fn get_all_settings(conn: &Connection) -> Result<HashMap<String, String>, DbError> {
  let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
  let rows = stmt.query_map([], |r| {
    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
  })?;

  let mut settings = HashMap::new();
  for row in rows {
    let (k, v) = row?;
    settings.insert(k, v);
  }
  Ok(settings)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str, updated_at: &str) -> Result<(), DbError> {
  conn.execute(
    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    (key, value, updated_at)
  )?;
  Ok(())
}
