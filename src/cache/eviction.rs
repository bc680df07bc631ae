//! Usage accounting and least-recently-used eviction for the metadata cache.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::StoreResult;
use super::storage::{size_units, KeyValueStorage};

/// Approximate space consumed by the cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageUsage {
  pub used_bytes: u64,
  pub total_estimated_bytes: u64,
  pub percentage: f64,
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionReport {
  /// Valid entries removed to make room
  pub removed: usize,
  /// Unparsable entries removed on sight
  pub corrupt_removed: usize,
  /// Usage after the pass
  pub usage: StorageUsage,
}

/// Only the field eviction needs; everything else in the entry is ignored.
#[derive(Deserialize)]
struct EntryStamp {
  timestamp: i64,
}

/// Thresholds and accounting scope for eviction.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
  /// Only keys under this prefix are counted and evicted
  pub namespace: String,
  /// Fixed conservative capacity estimate, in size units
  pub capacity: u64,
  /// Usage above which a write first evicts proactively
  pub high_water_percent: f64,
  /// Target for proactive eviction
  pub proactive_target_percent: f64,
  /// Target after a write was refused for capacity
  pub reactive_target_percent: f64,
}

impl EvictionPolicy {
  pub fn new(namespace: impl Into<String>, capacity: u64) -> Self {
    Self {
      namespace: namespace.into(),
      capacity,
      high_water_percent: 90.0,
      proactive_target_percent: 80.0,
      reactive_target_percent: 70.0,
    }
  }

  fn namespaced_keys(&self, storage: &dyn KeyValueStorage) -> StoreResult<Vec<String>> {
    let mut keys: Vec<String> = storage
      .keys()?
      .into_iter()
      .filter(|k| k.starts_with(&self.namespace))
      .collect();
    keys.sort();
    Ok(keys)
  }

  /// Sum the approximate size of every entry in the namespace.
  pub fn usage(&self, storage: &dyn KeyValueStorage) -> StoreResult<StorageUsage> {
    let mut used = 0u64;
    for key in self.namespaced_keys(storage)? {
      if let Some(value) = storage.get_item(&key)? {
        used += size_units(&value);
      }
    }

    let percentage = if self.capacity == 0 {
      100.0
    } else {
      used as f64 / self.capacity as f64 * 100.0
    };

    Ok(StorageUsage {
      used_bytes: used,
      total_estimated_bytes: self.capacity,
      percentage,
    })
  }

  /// Whether a write should be preceded by proactive eviction.
  pub fn above_high_water(&self, usage: &StorageUsage) -> bool {
    usage.percentage > self.high_water_percent
  }

  /// Remove least-recently-used entries until usage drops below `target_percent`.
  ///
  /// Corrupt entries are deleted regardless of the target. Terminates after at
  /// most one removal per entry, leaving the namespace empty if that is still
  /// not enough.
  pub fn evict_until(
    &self,
    storage: &dyn KeyValueStorage,
    target_percent: f64,
  ) -> StoreResult<EvictionReport> {
    let mut candidates = Vec::new();
    let mut corrupt_removed = 0;

    for key in self.namespaced_keys(storage)? {
      let Some(raw) = storage.get_item(&key)? else {
        continue;
      };
      match serde_json::from_str::<EntryStamp>(&raw) {
        Ok(stamp) => candidates.push((stamp.timestamp, key)),
        Err(e) => {
          debug!("Removing corrupt cache entry {}: {}", key, e);
          storage.remove_item(&key)?;
          corrupt_removed += 1;
        }
      }
    }

    // Stable sort keeps ties in key order
    candidates.sort_by_key(|(timestamp, _)| *timestamp);

    let mut usage = self.usage(storage)?;
    let mut removed = 0;
    for (_, key) in candidates {
      if usage.percentage < target_percent {
        break;
      }
      storage.remove_item(&key)?;
      removed += 1;
      usage = self.usage(storage)?;
    }

    debug!(
      "Eviction to {}% removed {} entries ({} corrupt), usage now {:.1}%",
      target_percent, removed, corrupt_removed, usage.percentage
    );

    Ok(EvictionReport {
      removed,
      corrupt_removed,
      usage,
    })
  }
}
