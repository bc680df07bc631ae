//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

use super::metadata::{MetadataStore, SetOptions};
use super::traits::CacheResult;

/// How a single read-through should behave.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
  /// TTL for data that came from the network
  pub ttl_minutes: i64,
  /// TTL for fallback data, kept short so the network is retried soon
  pub fallback_ttl_minutes: i64,
  /// Skip the cache lookup (ignored while offline)
  pub force_refresh: bool,
  /// Whether the network may be contacted at all
  pub online: bool,
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching with a placeholder fallback.
#[derive(Clone)]
pub struct CacheLayer {
  store: MetadataStore,
}

impl CacheLayer {
  /// Create a new cache layer over the given metadata store.
  pub fn new(store: MetadataStore) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &MetadataStore {
    &self.store
  }

  /// Fetch with cache-first strategy and a fallback that never errors.
  ///
  /// 1. Check cache (unless a refresh is forced while online) - hit returns immediately
  /// 2. Fetch from network, skipped entirely while offline
  /// 3. On network failure, ask `fallback` and cache its answer with the short TTL
  /// 4. Cache network data with the regular TTL
  ///
  /// Returns `None` only when the network failed and the fallback had nothing.
  pub async fn fetch_with_fallback<T, E, F, Fut, G, GFut>(
    &self,
    key: &str,
    options: FetchOptions,
    fetcher: F,
    fallback: G,
  ) -> Option<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    G: FnOnce() -> GFut,
    GFut: Future<Output = Option<T>>,
  {
    if !options.force_refresh || !options.online {
      match self.store.get_entry::<T>(key) {
        Ok(Some(entry)) => return Some(CacheResult::from_cache(entry.data, entry.timestamp)),
        Ok(None) => {}
        Err(e) => warn!("Cache read for {} failed: {}", key, e),
      }
    }

    if options.online {
      match fetcher().await {
        Ok(data) => {
          self.persist(key, &data, options.ttl_minutes);
          return Some(CacheResult::from_network(data));
        }
        Err(e) => warn!("Fetching {} failed, serving fallback: {}", key, e),
      }
    } else {
      debug!("Offline, serving fallback for {}", key);
    }

    let data = fallback().await?;
    self.persist(key, &data, options.fallback_ttl_minutes);
    Some(CacheResult::placeholder(data))
  }

  /// Best-effort write; a refused write is logged and the caller carries on
  /// with its in-memory copy.
  pub fn persist<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl_minutes: i64) {
    if let Err(e) = self.store.set(key, data, SetOptions::expire_in(ttl_minutes)) {
      warn!("Dropping cache write for {}: {}", key, e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::eviction::EvictionPolicy;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::traits::CacheSource;
  use crate::test_support::ManualClock;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn layer() -> (CacheLayer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let store = MetadataStore::new(
      Arc::new(MemoryStorage::new(u64::MAX)),
      clock.clone(),
      EvictionPolicy::new("t_", 1_000_000),
    );
    (CacheLayer::new(store), clock)
  }

  fn options() -> FetchOptions {
    FetchOptions {
      ttl_minutes: 15,
      fallback_ttl_minutes: 5,
      force_refresh: false,
      online: true,
    }
  }

  #[tokio::test]
  async fn test_second_read_is_served_from_cache() {
    let (layer, _) = layer();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    for expected in [CacheSource::Network, CacheSource::Cache] {
      let result = layer
        .fetch_with_fallback(
          "k",
          options(),
          || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(vec![1, 2, 3])
          },
          || async { None },
        )
        .await
        .unwrap();
      assert_eq!(result.source, expected);
      assert_eq!(result.data, vec![1, 2, 3]);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failure_uses_fallback_with_short_ttl() {
    let (layer, clock) = layer();

    let result = layer
      .fetch_with_fallback(
        "k",
        options(),
        || async { Err::<Vec<i32>, _>("boom") },
        || async { Some(vec![9]) },
      )
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Placeholder);
    assert_eq!(result.data, vec![9]);

    clock.advance(4 * 60_000);
    assert_eq!(layer.store().get::<Vec<i32>>("k").unwrap(), Some(vec![9]));
    clock.advance(60_000);
    assert_eq!(layer.store().get::<Vec<i32>>("k").unwrap(), None);
  }

  #[tokio::test]
  async fn test_force_refresh_skips_cache() {
    let (layer, _) = layer();
    layer.persist("k", &1, 15);

    let result = layer
      .fetch_with_fallback(
        "k",
        FetchOptions {
          force_refresh: true,
          ..options()
        },
        || async { Ok::<_, String>(2) },
        || async { None },
      )
      .await
      .unwrap();
    assert_eq!(result.data, 2);
    assert_eq!(layer.store().get::<i32>("k").unwrap(), Some(2));
  }

  #[tokio::test]
  async fn test_offline_ignores_refresh_and_never_fetches() {
    let (layer, _) = layer();
    layer.persist("k", &1, 15);
    let offline = FetchOptions {
      force_refresh: true,
      online: false,
      ..options()
    };

    let cached = layer
      .fetch_with_fallback(
        "k",
        offline,
        || async { Err::<i32, _>("must not be called") },
        || async { None },
      )
      .await
      .unwrap();
    assert_eq!(cached.source, CacheSource::Cache);

    let missing = layer
      .fetch_with_fallback(
        "other",
        offline,
        || async { Ok::<i32, String>(5) },
        || async { None },
      )
      .await;
    assert!(missing.is_none());
  }
}
