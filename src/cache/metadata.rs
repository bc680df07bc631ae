//! TTL-aware metadata cache on top of a [`KeyValueStorage`] backend.
//!
//! Values are wrapped in a [`CacheEntry`] and stored as JSON under a shared
//! namespace prefix. Reads refresh the entry's timestamp, which is what the
//! eviction policy orders by.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{CacheError, StoreResult};
use super::eviction::{EvictionPolicy, EvictionReport, StorageUsage};
use super::storage::KeyValueStorage;
use super::traits::{CacheEntry, Clock};

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
  pub expire_in_minutes: Option<i64>,
}

impl SetOptions {
  pub fn expire_in(minutes: i64) -> Self {
    Self {
      expire_in_minutes: Some(minutes),
    }
  }
}

/// Ephemeral, size-bounded JSON cache.
#[derive(Clone)]
pub struct MetadataStore {
  storage: Arc<dyn KeyValueStorage>,
  clock: Arc<dyn Clock>,
  policy: EvictionPolicy,
}

impl MetadataStore {
  pub fn new(
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    policy: EvictionPolicy,
  ) -> Self {
    Self {
      storage,
      clock,
      policy,
    }
  }

  fn namespaced(&self, key: &str) -> String {
    format!("{}{}", self.policy.namespace, key)
  }

  pub fn now(&self) -> i64 {
    self.clock.now_millis()
  }

  /// Store `data` under `key`.
  ///
  /// Evicts proactively when usage is above the high-water mark. A write the
  /// backend refuses for capacity triggers one aggressive eviction and a
  /// single retry; if that also fails the capacity error is returned.
  pub fn set<T: Serialize + ?Sized>(
    &self,
    key: &str,
    data: &T,
    options: SetOptions,
  ) -> StoreResult<()> {
    let entry = CacheEntry::new(data, self.now(), options.expire_in_minutes);
    let raw = serde_json::to_string(&entry)?;

    let usage = self.policy.usage(self.storage.as_ref())?;
    if self.policy.above_high_water(&usage) {
      debug!(
        "Cache usage {:.1}% above high-water mark, evicting before write",
        usage.percentage
      );
      let report = self.evict_until(self.policy.proactive_target_percent)?;
      debug!(
        "Evicted {} entries ({} corrupt), usage now {:.1}%",
        report.removed, report.corrupt_removed, report.usage.percentage
      );
    }

    let full_key = self.namespaced(key);
    match self.storage.set_item(&full_key, &raw) {
      Err(e) if e.is_capacity_exceeded() => {
        warn!("Cache write for {} refused ({}), evicting and retrying", key, e);
        self.evict_until(self.policy.reactive_target_percent)?;
        self.storage.set_item(&full_key, &raw)
      }
      other => other,
    }
  }

  /// Read the value stored under `key`.
  ///
  /// Expired and corrupt entries are deleted and reported as a miss. A hit
  /// refreshes the entry's timestamp.
  #[allow(dead_code)]
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
    Ok(self.get_entry(key)?.map(|entry| entry.data))
  }

  /// Like [`MetadataStore::get`] but returns the whole envelope.
  pub fn get_entry<T: DeserializeOwned>(
    &self,
    key: &str,
  ) -> StoreResult<Option<CacheEntry<T>>> {
    let full_key = self.namespaced(key);
    let Some(raw) = self.storage.get_item(&full_key)? else {
      return Ok(None);
    };

    let entry = match decode_entry::<T>(&full_key, &raw) {
      Ok(entry) => entry,
      Err(e) => {
        debug!("Dropping {}", e);
        self.storage.remove_item(&full_key)?;
        return Ok(None);
      }
    };

    let now = self.now();
    if entry.is_expired(now) {
      debug!("Cache entry {} expired", key);
      self.storage.remove_item(&full_key)?;
      return Ok(None);
    }

    // Touch only the timestamp so fields unknown to `T` survive the rewrite
    if let Ok(mut value) = serde_json::from_str::<Value>(&raw) {
      if let Some(object) = value.as_object_mut() {
        object.insert("timestamp".to_string(), Value::from(now));
        if let Err(e) = self.storage.set_item(&full_key, &value.to_string()) {
          debug!("Failed to refresh timestamp for {}: {}", key, e);
        }
      }
    }

    Ok(Some(CacheEntry {
      timestamp: now,
      ..entry
    }))
  }

  /// Read an entry without touching its timestamp or expiry.
  ///
  /// Returns `CorruptEntry` for unparsable payloads so the caller can decide
  /// whether to skip or delete.
  pub fn peek_entry<T: DeserializeOwned>(
    &self,
    key: &str,
  ) -> StoreResult<Option<CacheEntry<T>>> {
    let full_key = self.namespaced(key);
    match self.storage.get_item(&full_key)? {
      Some(raw) => decode_entry(&full_key, &raw).map(Some),
      None => Ok(None),
    }
  }

  /// Overwrite an entry verbatim, keeping its timestamp and expiry.
  pub fn replace_entry<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) -> StoreResult<()> {
    let raw = serde_json::to_string(entry)?;
    self.storage.set_item(&self.namespaced(key), &raw)
  }

  /// Delete `key` if present.
  pub fn remove(&self, key: &str) -> StoreResult<()> {
    self.storage.remove_item(&self.namespaced(key))
  }

  /// Logical keys (namespace stripped) that start with `prefix`.
  pub fn scan_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
    let full_prefix = self.namespaced(prefix);
    let mut keys: Vec<String> = self
      .storage
      .keys()?
      .into_iter()
      .filter(|k| k.starts_with(&full_prefix))
      .map(|k| k[self.policy.namespace.len()..].to_string())
      .collect();
    keys.sort();
    Ok(keys)
  }

  /// Remove every entry in the namespace. Returns how many were removed.
  pub fn clear(&self) -> StoreResult<usize> {
    let keys = self.scan_by_prefix("")?;
    for key in &keys {
      self.remove(key)?;
    }
    Ok(keys.len())
  }

  pub fn usage(&self) -> StoreResult<StorageUsage> {
    self.policy.usage(self.storage.as_ref())
  }

  pub fn evict_until(&self, target_percent: f64) -> StoreResult<EvictionReport> {
    self.policy.evict_until(self.storage.as_ref(), target_percent)
  }
}

fn decode_entry<T: DeserializeOwned>(full_key: &str, raw: &str) -> StoreResult<CacheEntry<T>> {
  serde_json::from_str(raw).map_err(|e| CacheError::CorruptEntry {
    key: full_key.to_string(),
    reason: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::test_support::ManualClock;

  fn store_with(
    quota: u64,
    capacity: u64,
  ) -> (MetadataStore, Arc<MemoryStorage>, Arc<ManualClock>) {
    let storage = Arc::new(MemoryStorage::new(quota));
    let clock = Arc::new(ManualClock::new(1_000_000));
    let store = MetadataStore::new(
      storage.clone(),
      clock.clone(),
      EvictionPolicy::new("test_", capacity),
    );
    (store, storage, clock)
  }

  #[test]
  fn test_set_then_get() {
    let (store, storage, _) = store_with(u64::MAX, u64::MAX);
    store.set("k", &vec![1, 2, 3], SetOptions::default()).unwrap();
    assert_eq!(store.get::<Vec<i32>>("k").unwrap(), Some(vec![1, 2, 3]));
    assert!(storage.get_item("test_k").unwrap().is_some());
  }

  #[test]
  fn test_ttl_boundary() {
    let (store, storage, clock) = store_with(u64::MAX, u64::MAX);
    store.set("k", &"v", SetOptions::expire_in(15)).unwrap();

    clock.advance(15 * 60_000 - 1);
    assert_eq!(store.get::<String>("k").unwrap().as_deref(), Some("v"));

    clock.advance(1);
    assert_eq!(store.get::<String>("k").unwrap(), None);
    assert!(storage.get_item("test_k").unwrap().is_none());
  }

  #[test]
  fn test_read_refreshes_timestamp_but_not_expiry() {
    let (store, _, clock) = store_with(u64::MAX, u64::MAX);
    store.set("k", &1, SetOptions::expire_in(1)).unwrap();
    let written: CacheEntry<i32> = store.peek_entry("k").unwrap().unwrap();

    clock.advance(5_000);
    store.get::<i32>("k").unwrap();

    let read: CacheEntry<i32> = store.peek_entry("k").unwrap().unwrap();
    assert_eq!(read.timestamp, written.timestamp + 5_000);
    assert_eq!(read.expires_at, written.expires_at);
  }

  #[test]
  fn test_corrupt_entry_is_removed_on_read() {
    let (store, storage, _) = store_with(u64::MAX, u64::MAX);
    storage.set_item("test_bad", "not json").unwrap();
    storage.set_item("test_shape", "{\"data\":\"text\",\"timestamp\":1}").unwrap();

    assert_eq!(store.get::<i32>("bad").unwrap(), None);
    assert_eq!(store.get::<i32>("shape").unwrap(), None);
    assert!(storage.keys().unwrap().is_empty());
  }

  #[test]
  fn test_peek_reports_corrupt_entry() {
    let (store, storage, _) = store_with(u64::MAX, u64::MAX);
    storage.set_item("test_bad", "{").unwrap();
    let err = store.peek_entry::<i32>("bad").unwrap_err();
    assert!(matches!(err, CacheError::CorruptEntry { .. }));
    // Peeking does not heal
    assert!(storage.get_item("test_bad").unwrap().is_some());
  }

  #[test]
  fn test_scan_by_prefix_strips_namespace() {
    let (store, storage, _) = store_with(u64::MAX, u64::MAX);
    store.set("documents_{}", &1, SetOptions::default()).unwrap();
    store.set("documents_{\"status\":\"approved\"}", &2, SetOptions::default()).unwrap();
    store.set("document_a", &3, SetOptions::default()).unwrap();
    storage.set_item("documents_foreign", "x").unwrap();

    let keys = store.scan_by_prefix("documents_").unwrap();
    assert_eq!(
      keys,
      vec![
        "documents_{\"status\":\"approved\"}".to_string(),
        "documents_{}".to_string()
      ]
    );
  }

  #[test]
  fn test_remove_missing_key_is_ok() {
    let (store, _, _) = store_with(u64::MAX, u64::MAX);
    store.remove("nothing").unwrap();
  }

  #[test]
  fn test_capacity_failure_evicts_and_retries_once() {
    let payload = "p".repeat(200);
    let entry_size = crate::cache::storage::size_units(
      &serde_json::to_string(&CacheEntry::new(&payload, 1_000_000, None)).unwrap(),
    );
    // Room for exactly three entries; policy capacity is large so no proactive pass
    let (store, storage, clock) = store_with(entry_size * 3, entry_size * 100);

    for key in ["a", "b", "c"] {
      store.set(key, &payload, SetOptions::default()).unwrap();
      clock.advance(1);
    }
    // Usage is 3% of the policy capacity: the reactive pass has nothing to do
    assert!(store
      .set("d", &payload, SetOptions::default())
      .unwrap_err()
      .is_capacity_exceeded());
    assert_eq!(storage.keys().unwrap().len(), 3);
  }

  #[test]
  fn test_reactive_eviction_makes_room() {
    let payload = "p".repeat(200);
    let entry_size = crate::cache::storage::size_units(
      &serde_json::to_string(&CacheEntry::new(&payload, 1_000_000, None)).unwrap(),
    );
    // Quota and capacity both hold three entries; proactive threshold disabled
    let (mut store, storage, clock) = store_with(entry_size * 3, entry_size * 3);
    store.policy.high_water_percent = 101.0;

    for key in ["a", "b", "c"] {
      store.set(key, &payload, SetOptions::default()).unwrap();
      clock.advance(1);
    }
    store.get::<String>("a").unwrap();
    clock.advance(1);

    store.set("d", &payload, SetOptions::default()).unwrap();

    // One removal brings usage to 66%; "b" was the least recently used
    assert!(storage.get_item("test_a").unwrap().is_some());
    assert!(storage.get_item("test_b").unwrap().is_none());
    assert!(storage.get_item("test_c").unwrap().is_some());
    assert!(storage.get_item("test_d").unwrap().is_some());
  }

  #[test]
  fn test_proactive_eviction_at_high_water() {
    let (mut store, _, clock) = store_with(u64::MAX, 100_000);
    let payload = "x".repeat(1_000);

    // Fill past 95% without letting the store evict along the way
    store.policy.high_water_percent = 101.0;
    let mut i = 0;
    while store.usage().unwrap().percentage <= 95.0 {
      store
        .set(&format!("fill_{:03}", i), &payload, SetOptions::default())
        .unwrap();
      clock.advance(1);
      i += 1;
    }
    store.policy.high_water_percent = 90.0;

    store.set("one_more", &"small", SetOptions::default()).unwrap();

    let usage = store.usage().unwrap();
    assert!(usage.percentage < 90.0, "usage still {}", usage.percentage);
    assert_eq!(store.get::<String>("one_more").unwrap().as_deref(), Some("small"));
    // The oldest filler went first
    assert_eq!(store.get::<String>("fill_000").unwrap(), None);
  }

  #[test]
  fn test_clear_removes_namespace_only() {
    let (store, storage, _) = store_with(u64::MAX, u64::MAX);
    store.set("a", &1, SetOptions::default()).unwrap();
    store.set("b", &2, SetOptions::default()).unwrap();
    storage.set_item("foreign", "1").unwrap();

    assert_eq!(store.clear().unwrap(), 2);
    assert_eq!(storage.keys().unwrap(), vec!["foreign".to_string()]);
  }
}
