//! Core traits and types for the caching system.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Source of "now" for every timestamp the cache writes.
///
/// Injected so expiry and LRU ordering can be driven deterministically.
pub trait Clock: Send + Sync {
  /// Milliseconds since the Unix epoch.
  fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_millis(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}

/// Envelope persisted for every metadata cache value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub data: T,
  /// Last write or last successful read, in epoch milliseconds.
  pub timestamp: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<i64>,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, now: i64, expire_in_minutes: Option<i64>) -> Self {
    Self {
      data,
      timestamp: now,
      expires_at: expire_in_minutes.map(|m| now + m * 60_000),
    }
  }

  pub fn is_expired(&self, now: i64) -> bool {
    matches!(self.expires_at, Some(at) if at <= now)
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was last touched in the cache (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, timestamp: i64) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Utc.timestamp_millis_opt(timestamp).single(),
    }
  }

  /// Create a new cache result carrying built-in placeholder data.
  pub fn placeholder(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Placeholder,
      cached_at: None,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Unexpired data from the metadata cache
  Cache,
  /// Network unavailable or malformed, serving fallback data
  Placeholder,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
      CacheSource::Placeholder => "placeholder",
    };
    f.write_str(label)
  }
}
