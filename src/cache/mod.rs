//! Local caching for offline document access.
//!
//! This module is agnostic of the document API. It provides:
//! - A TTL-aware JSON metadata cache over a quota-bounded key/value backend
//! - Least-recently-used eviction driven by approximate usage
//! - A durable, TTL-free store for binary payloads
//! - A read-through layer with a placeholder fallback for failed fetches

mod content;
mod error;
mod eviction;
mod layer;
mod metadata;
mod storage;
mod traits;

pub use content::{
  ContentMetadata, ContentStore, MemoryContentStore, SqliteContentStore, StoredContent,
  UnavailableContentStore,
};
pub use error::StoreResult;
pub use eviction::{EvictionPolicy, StorageUsage};
pub use layer::{CacheLayer, FetchOptions};
pub use metadata::MetadataStore;
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
pub use traits::{CacheEntry, CacheResult, CacheSource, SystemClock};

#[cfg(test)]
pub use metadata::SetOptions;
#[cfg(test)]
pub use traits::Clock;
