//! Keeps the offline-availability flag consistent across cached snapshots.
//!
//! A document can appear in any number of cached lists (one per filter
//! combination) plus its own single-document entry. Whenever its content is
//! stored or removed, every one of those copies is patched in place.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, MetadataStore};

use super::cache::{DOCUMENT_PREFIX, LIST_PREFIX};
use super::types::DocumentPatch;

/// Rewrites cached document snapshots on behalf of the document cache.
#[derive(Clone)]
pub struct OfflineSynchronizer {
  store: MetadataStore,
}

impl OfflineSynchronizer {
  pub fn new(store: MetadataStore) -> Self {
    Self { store }
  }

  /// Merge `patch` into every cached copy of document `id`.
  ///
  /// Returns the number of cache entries rewritten. Malformed entries are
  /// skipped; this never fails.
  pub fn propagate(&self, id: &str, patch: &DocumentPatch) -> usize {
    let patch = match serde_json::to_value(patch) {
      Ok(Value::Object(map)) if !map.is_empty() => map,
      _ => return 0,
    };

    let mut updated = 0;
    for key in self.keys(LIST_PREFIX) {
      updated += self.rewrite(&key, |data| match data.as_array_mut() {
        Some(items) => items
          .iter_mut()
          .filter(|item| document_id(item) == Some(id))
          .fold(false, |changed, item| merge(item, &patch) || changed),
        None => false,
      });
    }

    let detail_key = format!("{}{}", DOCUMENT_PREFIX, id);
    updated += self.rewrite(&detail_key, |data| {
      let matches = document_id(data) == Some(id);
      matches && merge(data, &patch)
    });

    debug!("Propagated offline flag for {} into {} entries", id, updated);
    updated
  }

  /// Mark every cached document as not available offline.
  pub fn reset_all_offline_flags(&self) -> usize {
    let mut patch = Map::new();
    patch.insert("isAvailableOffline".to_string(), Value::Bool(false));

    let mut updated = 0;
    for key in self.keys(LIST_PREFIX) {
      updated += self.rewrite(&key, |data| match data.as_array_mut() {
        Some(items) => items
          .iter_mut()
          .fold(false, |changed, item| merge(item, &patch) || changed),
        None => false,
      });
    }
    for key in self.keys(DOCUMENT_PREFIX) {
      updated += self.rewrite(&key, |data| merge(data, &patch));
    }

    debug!("Cleared offline flags in {} entries", updated);
    updated
  }

  fn keys(&self, prefix: &str) -> Vec<String> {
    self.store.scan_by_prefix(prefix).unwrap_or_else(|e| {
      warn!("Failed to scan cache for {}: {}", prefix, e);
      Vec::new()
    })
  }

  /// Apply `edit` to one entry's data and write it back only if it changed.
  fn rewrite<F>(&self, key: &str, edit: F) -> usize
  where
    F: FnOnce(&mut Value) -> bool,
  {
    let mut entry: CacheEntry<Value> = match self.store.peek_entry(key) {
      Ok(Some(entry)) => entry,
      Ok(None) => return 0,
      Err(e) => {
        warn!("Skipping cache entry {} during propagation: {}", key, e);
        return 0;
      }
    };

    if entry.is_expired(self.store.now()) || !edit(&mut entry.data) {
      return 0;
    }

    match self.store.replace_entry(key, &entry) {
      Ok(()) => 1,
      Err(e) => {
        warn!("Failed to rewrite cache entry {}: {}", key, e);
        0
      }
    }
  }
}

fn document_id(value: &Value) -> Option<&str> {
  value.get("id").and_then(Value::as_str)
}

/// Merge `patch` into `target` if it is an object. Returns whether anything changed.
fn merge(target: &mut Value, patch: &Map<String, Value>) -> bool {
  let Some(object) = target.as_object_mut() else {
    return false;
  };

  let mut changed = false;
  for (field, value) in patch {
    if object.get(field) != Some(value) {
      object.insert(field.clone(), value.clone());
      changed = true;
    }
  }
  changed
}
