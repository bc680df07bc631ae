//! Error type shared by the metadata and content stores.

use thiserror::Error;

/// Errors raised by the on-device stores.
#[derive(Error, Debug)]
pub enum CacheError {
  /// The backend refused a write because its quota is exhausted.
  #[error("storage quota exceeded: {required} units needed, {available} available")]
  CapacityExceeded { required: u64, available: u64 },

  /// A stored entry could not be decoded into the expected shape.
  #[error("corrupt cache entry '{key}': {reason}")]
  CorruptEntry { key: String, reason: String },

  #[error("failed to serialize cache entry: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("cache database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("cache lock poisoned")]
  LockPoisoned,
}

impl CacheError {
  pub fn is_capacity_exceeded(&self) -> bool {
    matches!(self, CacheError::CapacityExceeded { .. })
  }
}

impl<T> From<std::sync::PoisonError<T>> for CacheError {
  fn from(_: std::sync::PoisonError<T>) -> Self {
    CacheError::LockPoisoned
  }
}

pub type StoreResult<T> = std::result::Result<T, CacheError>;
