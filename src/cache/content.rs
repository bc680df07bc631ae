//! Durable store for downloaded document payloads.
//!
//! Unlike the metadata cache, entries here have no TTL and are never evicted
//! automatically; they live until explicitly deleted or cleared.

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::error::StoreResult;

/// Descriptive data kept next to a stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
  pub id: String,
  pub name: String,
  pub content_type: String,
  pub size: u64,
  /// Hex SHA-256 of the payload
  pub checksum: String,
}

/// A payload held in the durable store.
#[derive(Debug, Clone)]
pub struct StoredContent {
  pub id: String,
  pub blob: Bytes,
  pub metadata: ContentMetadata,
  /// Insertion time in epoch milliseconds
  pub timestamp: i64,
}

impl StoredContent {
  pub fn new(
    id: impl Into<String>,
    blob: Bytes,
    name: impl Into<String>,
    content_type: impl Into<String>,
    timestamp: i64,
  ) -> Self {
    let id = id.into();
    let metadata = ContentMetadata {
      id: id.clone(),
      name: name.into(),
      content_type: content_type.into(),
      size: blob.len() as u64,
      checksum: checksum(&blob),
    };
    Self {
      id,
      blob,
      metadata,
      timestamp,
    }
  }

  /// Whether the payload still matches the checksum recorded at insertion.
  pub fn is_intact(&self) -> bool {
    checksum(&self.blob) == self.metadata.checksum
  }
}

/// Calculate the hex SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

/// Trait for durable content backends.
#[async_trait]
pub trait ContentStore: Send + Sync {
  /// Whether writes actually persist anything.
  fn is_available(&self) -> bool {
    true
  }

  /// Store `content`, replacing any previous entry with the same id.
  async fn put(&self, content: StoredContent) -> StoreResult<()>;

  /// Fetch a stored payload. A missing id is `Ok(None)`, not an error.
  async fn get(&self, id: &str) -> StoreResult<Option<StoredContent>>;

  /// Whether a payload is stored for `id`.
  async fn contains(&self, id: &str) -> StoreResult<bool>;

  /// Remove the payload for `id` if present.
  async fn delete(&self, id: &str) -> StoreResult<()>;

  /// Remove every payload. Returns how many were removed.
  async fn clear_all(&self) -> StoreResult<usize>;

  /// Metadata of every stored payload, oldest first.
  async fn list(&self) -> StoreResult<Vec<ContentMetadata>>;
}

/// Store used when the durable engine cannot be opened.
///
/// Reads always miss and writes are discarded, so the rest of the
/// application keeps working online-only.
pub struct UnavailableContentStore;

#[async_trait]
impl ContentStore for UnavailableContentStore {
  fn is_available(&self) -> bool {
    false
  }

  async fn put(&self, content: StoredContent) -> StoreResult<()> {
    debug!("Durable store unavailable, dropping content {}", content.id);
    Ok(())
  }

  async fn get(&self, _id: &str) -> StoreResult<Option<StoredContent>> {
    Ok(None)
  }

  async fn contains(&self, _id: &str) -> StoreResult<bool> {
    Ok(false)
  }

  async fn delete(&self, _id: &str) -> StoreResult<()> {
    Ok(())
  }

  async fn clear_all(&self) -> StoreResult<usize> {
    Ok(0)
  }

  async fn list(&self) -> StoreResult<Vec<ContentMetadata>> {
    Ok(Vec::new())
  }
}

/// Session-only content store.
#[derive(Default)]
pub struct MemoryContentStore {
  items: Mutex<BTreeMap<String, StoredContent>>,
}

impl MemoryContentStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
  async fn put(&self, content: StoredContent) -> StoreResult<()> {
    self.items.lock()?.insert(content.id.clone(), content);
    Ok(())
  }

  async fn get(&self, id: &str) -> StoreResult<Option<StoredContent>> {
    Ok(self.items.lock()?.get(id).cloned())
  }

  async fn contains(&self, id: &str) -> StoreResult<bool> {
    Ok(self.items.lock()?.contains_key(id))
  }

  async fn delete(&self, id: &str) -> StoreResult<()> {
    self.items.lock()?.remove(id);
    Ok(())
  }

  async fn clear_all(&self) -> StoreResult<usize> {
    let mut items = self.items.lock()?;
    let count = items.len();
    items.clear();
    Ok(count)
  }

  async fn list(&self) -> StoreResult<Vec<ContentMetadata>> {
    let items = self.items.lock()?;
    let mut stored: Vec<&StoredContent> = items.values().collect();
    stored.sort_by_key(|c| c.timestamp);
    Ok(stored.into_iter().map(|c| c.metadata.clone()).collect())
  }
}

/// SQLite-based durable content store.
pub struct SqliteContentStore {
  conn: Mutex<Connection>,
}

/// Schema for stored payloads.
const CONTENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stored_documents (
    id TEXT PRIMARY KEY,
    blob BLOB NOT NULL,
    name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
"#;

impl SqliteContentStore {
  /// Open (or create) the content database at `path`.
  pub fn open(path: &Path) -> StoreResult<Self> {
    Self::with_connection(Connection::open(path)?)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> StoreResult<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> StoreResult<Self> {
    conn.execute_batch(CONTENT_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
  async fn put(&self, content: StoredContent) -> StoreResult<()> {
    let conn = self.conn.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO stored_documents
         (id, blob, name, content_type, size, checksum, timestamp)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        content.id,
        content.blob.as_ref(),
        content.metadata.name,
        content.metadata.content_type,
        content.metadata.size as i64,
        content.metadata.checksum,
        content.timestamp,
      ],
    )?;
    Ok(())
  }

  async fn get(&self, id: &str) -> StoreResult<Option<StoredContent>> {
    let conn = self.conn.lock()?;
    let row = conn
      .query_row(
        "SELECT blob, name, content_type, size, checksum, timestamp
         FROM stored_documents WHERE id = ?",
        params![id],
        |row| {
          let blob: Vec<u8> = row.get(0)?;
          let size: i64 = row.get(3)?;
          Ok(StoredContent {
            id: id.to_string(),
            blob: Bytes::from(blob),
            metadata: ContentMetadata {
              id: id.to_string(),
              name: row.get(1)?,
              content_type: row.get(2)?,
              size: size.max(0) as u64,
              checksum: row.get(4)?,
            },
            timestamp: row.get(5)?,
          })
        },
      )
      .optional()?;

    match row {
      Some(content) if !content.is_intact() => {
        warn!("Stored content {} failed integrity check, removing", id);
        conn.execute("DELETE FROM stored_documents WHERE id = ?", params![id])?;
        Ok(None)
      }
      other => Ok(other),
    }
  }

  async fn contains(&self, id: &str) -> StoreResult<bool> {
    let conn = self.conn.lock()?;
    let found = conn
      .query_row(
        "SELECT 1 FROM stored_documents WHERE id = ?",
        params![id],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }

  async fn delete(&self, id: &str) -> StoreResult<()> {
    let conn = self.conn.lock()?;
    conn.execute("DELETE FROM stored_documents WHERE id = ?", params![id])?;
    Ok(())
  }

  async fn clear_all(&self) -> StoreResult<usize> {
    let conn = self.conn.lock()?;
    let removed = conn.execute("DELETE FROM stored_documents", [])?;
    Ok(removed)
  }

  async fn list(&self) -> StoreResult<Vec<ContentMetadata>> {
    let conn = self.conn.lock()?;
    let mut stmt = conn.prepare(
      "SELECT id, name, content_type, size, checksum FROM stored_documents
       ORDER BY timestamp, id",
    )?;
    let items = stmt
      .query_map([], |row| {
        let size: i64 = row.get(3)?;
        Ok(ContentMetadata {
          id: row.get(0)?,
          name: row.get(1)?,
          content_type: row.get(2)?,
          size: size.max(0) as u64,
          checksum: row.get(4)?,
        })
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
  }
}
