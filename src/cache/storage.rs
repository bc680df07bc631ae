//! Raw key/value storage backends for the metadata cache.
//!
//! A backend behaves like a browser-style string store: flat keys, string
//! values, and a fixed quota. Writes that would exceed the quota fail with
//! [`CacheError::CapacityExceeded`] instead of succeeding partially.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::error::{CacheError, StoreResult};

/// Approximate cost of a stored string: two units per UTF-16 code unit.
pub fn size_units(value: &str) -> u64 {
  value.encode_utf16().count() as u64 * 2
}

/// Trait for raw metadata storage backends.
pub trait KeyValueStorage: Send + Sync {
  /// Read the raw value stored under `key`.
  fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

  /// Write `value` under `key`, replacing any previous value.
  fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;

  /// Delete `key`. Missing keys are not an error.
  fn remove_item(&self, key: &str) -> StoreResult<()>;

  /// Every key currently stored, in no particular order.
  fn keys(&self) -> StoreResult<Vec<String>>;
}

fn check_quota(quota: u64, used_without_key: u64, incoming: u64) -> StoreResult<()> {
  if used_without_key + incoming > quota {
    return Err(CacheError::CapacityExceeded {
      required: incoming,
      available: quota.saturating_sub(used_without_key),
    });
  }
  Ok(())
}

/// Session-only storage held in process memory.
pub struct MemoryStorage {
  items: Mutex<BTreeMap<String, String>>,
  quota: u64,
}

impl MemoryStorage {
  pub fn new(quota: u64) -> Self {
    Self {
      items: Mutex::new(BTreeMap::new()),
      quota,
    }
  }
}

impl KeyValueStorage for MemoryStorage {
  fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
    Ok(self.items.lock()?.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
    let mut items = self.items.lock()?;
    let used: u64 = items
      .iter()
      .filter(|(k, _)| k.as_str() != key)
      .map(|(_, v)| size_units(v))
      .sum();
    check_quota(self.quota, used, size_units(value))?;
    items.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> StoreResult<()> {
    self.items.lock()?.remove(key);
    Ok(())
  }

  fn keys(&self) -> StoreResult<Vec<String>> {
    Ok(self.items.lock()?.keys().cloned().collect())
  }
}

/// SQLite-based metadata storage that survives restarts.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  quota: u64,
}

impl SqliteStorage {
  /// Open (or create) the metadata database at `path`.
  pub fn open(path: &Path, quota: u64) -> StoreResult<Self> {
    let conn = Connection::open(path)?;
    Self::with_connection(conn, quota)
  }

  /// Open a throwaway database that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory(quota: u64) -> StoreResult<Self> {
    Self::with_connection(Connection::open_in_memory()?, quota)
  }

  fn with_connection(conn: Connection, quota: u64) -> StoreResult<Self> {
    conn.execute_batch(KV_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
      quota,
    })
  }
}

/// Schema for the key/value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    size_units INTEGER NOT NULL
);
"#;

impl KeyValueStorage for SqliteStorage {
  fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
    let conn = self.conn.lock()?;
    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
    let conn = self.conn.lock()?;
    let used: i64 = conn.query_row(
      "SELECT COALESCE(SUM(size_units), 0) FROM kv_store WHERE key != ?",
      params![key],
      |row| row.get(0),
    )?;
    let incoming = size_units(value);
    check_quota(self.quota, used.max(0) as u64, incoming)?;

    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, size_units) VALUES (?, ?, ?)",
      params![key, value, incoming as i64],
    )?;
    Ok(())
  }

  fn remove_item(&self, key: &str) -> StoreResult<()> {
    let conn = self.conn.lock()?;
    conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }

  fn keys(&self) -> StoreResult<Vec<String>> {
    let conn = self.conn.lock()?;
    let mut stmt = conn.prepare("SELECT key FROM kv_store")?;
    let keys = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_size_units_counts_utf16() {
    assert_eq!(size_units(""), 0);
    assert_eq!(size_units("abc"), 6);
    // U+1F600 is a surrogate pair in UTF-16
    assert_eq!(size_units("😀"), 4);
  }

  fn exercise_quota(storage: &dyn KeyValueStorage) {
    storage.set_item("a", "12345").unwrap();
    assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("12345"));

    // 10 + 12 > 20
    let err = storage.set_item("b", "123456").unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert_eq!(storage.get_item("b").unwrap(), None);

    // Overwriting an existing key only counts the new value
    storage.set_item("a", "1234567890").unwrap();
    storage.remove_item("a").unwrap();
    storage.remove_item("missing").unwrap();
    storage.set_item("b", "123456").unwrap();
    assert_eq!(storage.keys().unwrap(), vec!["b".to_string()]);
  }

  #[test]
  fn test_memory_storage_enforces_quota() {
    exercise_quota(&MemoryStorage::new(20));
  }

  #[test]
  fn test_sqlite_storage_enforces_quota() {
    exercise_quota(&SqliteStorage::open_in_memory(20).unwrap());
  }
}
