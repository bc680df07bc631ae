//! Cached document client: the single entry point used by the view layer.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{
  CacheLayer, CacheResult, ContentMetadata, ContentStore, FetchOptions, MetadataStore,
  StorageUsage, StoreResult, StoredContent,
};

use super::cache::{DocumentQueryKey, LIST_PREFIX};
use super::client::{safe_file_name, DocumentApi, DocumentError};
use super::placeholder::{placeholder_document, placeholder_list};
use super::sync::OfflineSynchronizer;
use super::types::{DocumentFilters, DocumentPatch, DocumentRecord, DownloadedDocument};

/// Tunables for the document cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
  pub list_ttl_minutes: i64,
  pub document_ttl_minutes: i64,
  pub fallback_ttl_minutes: i64,
  /// Downloads larger than this are returned but never stored
  pub max_persist_bytes: u64,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      list_ttl_minutes: 15,
      document_ttl_minutes: 60,
      fallback_ttl_minutes: 5,
      max_persist_bytes: 5 * 1024 * 1024,
    }
  }
}

/// Document client with transparent caching and offline storage.
///
/// Reads go through the metadata cache and never fail: when the API is
/// unreachable they fall back to placeholder data. Downloads go through the
/// durable content store and do report failures.
#[derive(Clone)]
pub struct DocumentCache {
  api: Arc<dyn DocumentApi>,
  layer: CacheLayer,
  content: Arc<dyn ContentStore>,
  sync: OfflineSynchronizer,
  settings: CacheSettings,
}

impl DocumentCache {
  pub fn new(
    api: Arc<dyn DocumentApi>,
    metadata: MetadataStore,
    content: Arc<dyn ContentStore>,
    settings: CacheSettings,
  ) -> Self {
    Self {
      api,
      sync: OfflineSynchronizer::new(metadata.clone()),
      layer: CacheLayer::new(metadata),
      content,
      settings,
    }
  }

  fn options(&self, ttl_minutes: i64, force_refresh: bool) -> FetchOptions {
    FetchOptions {
      ttl_minutes,
      fallback_ttl_minutes: self.settings.fallback_ttl_minutes,
      force_refresh,
      online: self.api.is_online(),
    }
  }

  async fn is_stored(&self, id: &str) -> bool {
    match self.content.contains(id).await {
      Ok(stored) => stored,
      Err(e) => {
        warn!("Failed to check stored content for {}: {}", id, e);
        false
      }
    }
  }

  /// Recompute the offline flag of every record from the durable store.
  async fn enrich(&self, mut documents: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let flags = join_all(documents.iter().map(|doc| self.is_stored(&doc.id))).await;
    for (doc, stored) in documents.iter_mut().zip(flags) {
      doc.is_available_offline = stored;
    }
    documents
  }

  /// List documents matching `filters`.
  pub async fn get_documents(
    &self,
    filters: &DocumentFilters,
    force_refresh: bool,
  ) -> CacheResult<Vec<DocumentRecord>> {
    let query = DocumentQueryKey::List(filters);
    debug!("Loading {}", query.description());

    let result = self
      .layer
      .fetch_with_fallback(
        &query.cache_key(),
        self.options(self.settings.list_ttl_minutes, force_refresh),
        || async move {
          let documents = self.api.fetch_document_list(filters).await?;
          Ok::<_, DocumentError>(self.enrich(documents).await)
        },
        || async move { Some(self.enrich(placeholder_list(filters)).await) },
      )
      .await;

    result.unwrap_or_else(|| CacheResult::placeholder(Vec::new()))
  }

  /// Get a single document.
  ///
  /// Without the network the record is looked up in any cached list, then in
  /// the placeholder set. `None` means no source knows the id.
  pub async fn get_document(
    &self,
    id: &str,
    force_refresh: bool,
  ) -> Option<CacheResult<DocumentRecord>> {
    let query = DocumentQueryKey::Detail(id);
    debug!("Loading {}", query.description());

    self
      .layer
      .fetch_with_fallback(
        &query.cache_key(),
        self.options(self.settings.document_ttl_minutes, force_refresh),
        || async move {
          let mut document = self.api.fetch_document(id).await?;
          document.is_available_offline = self.is_stored(id).await;
          Ok::<_, DocumentError>(document)
        },
        || async move {
          let mut document = self
            .find_in_cached_lists(id)
            .or_else(|| placeholder_document(id))?;
          document.is_available_offline = self.is_stored(id).await;
          Some(document)
        },
      )
      .await
  }

  /// Look for `id` in any unexpired cached list without touching LRU order.
  fn find_in_cached_lists(&self, id: &str) -> Option<DocumentRecord> {
    let store = self.layer.store();
    let keys = store.scan_by_prefix(LIST_PREFIX).ok()?;
    let now = store.now();

    keys.iter().find_map(|key| {
      let entry = store.peek_entry::<Vec<DocumentRecord>>(key).ok()??;
      if entry.is_expired(now) {
        return None;
      }
      entry.data.into_iter().find(|doc| doc.id == id)
    })
  }

  /// Download a document, keeping a copy for offline use when it is small enough.
  ///
  /// A copy already in the durable store is returned without touching the
  /// network. Failing to store the copy does not fail the download.
  pub async fn download_and_store_document(
    &self,
    id: &str,
  ) -> Result<DownloadedDocument, DocumentError> {
    if let Some(stored) = self.get_stored_document(id).await {
      debug!("Serving document {} from offline storage", id);
      return Ok(DownloadedDocument {
        bytes: stored.blob,
        metadata: stored.metadata,
        stored: true,
        from_store: true,
      });
    }

    if !self.api.is_online() {
      return Err(DocumentError::Offline);
    }

    let remote = self.api.fetch_document_bytes(id).await?;
    if remote.bytes.is_empty() {
      return Err(DocumentError::EmptyContent(id.to_string()));
    }

    let name = remote
      .file_name
      .clone()
      .or_else(|| {
        self
          .find_in_cached_lists(id)
          .and_then(|doc| safe_file_name(&doc.title))
      })
      .unwrap_or_else(|| id.to_string());
    let content = StoredContent::new(
      id,
      remote.bytes.clone(),
      name,
      remote.content_type,
      self.layer.store().now(),
    );
    let metadata = content.metadata.clone();

    let stored = if metadata.size > self.settings.max_persist_bytes {
      info!(
        "Document {} is {} bytes, above the {} byte offline limit; not stored",
        id, metadata.size, self.settings.max_persist_bytes
      );
      false
    } else if !self.content.is_available() {
      debug!("Offline storage unavailable, document {} not stored", id);
      false
    } else {
      match self.content.put(content).await {
        Ok(()) => {
          self.sync.propagate(id, &DocumentPatch::offline(true));
          info!("Stored document {} for offline use ({} bytes)", id, metadata.size);
          true
        }
        Err(e) => {
          warn!("Failed to store document {} for offline use: {}", id, e);
          false
        }
      }
    };

    Ok(DownloadedDocument {
      bytes: remote.bytes,
      metadata,
      stored,
      from_store: false,
    })
  }

  /// Read a stored payload. Storage errors are logged and reported as absent.
  pub async fn get_stored_document(&self, id: &str) -> Option<StoredContent> {
    match self.content.get(id).await {
      Ok(content) => content,
      Err(e) => {
        warn!("Failed to read stored document {}: {}", id, e);
        None
      }
    }
  }

  /// Drop the offline copy of `id`.
  ///
  /// Cached flags are cleared before the durable delete is awaited, so a list
  /// read in between already reports the document as unavailable.
  pub async fn remove_stored_document(&self, id: &str) -> StoreResult<()> {
    self.sync.propagate(id, &DocumentPatch::offline(false));
    self.content.delete(id).await?;
    info!("Removed offline copy of document {}", id);
    Ok(())
  }

  /// Drop every offline copy. Returns how many payloads were removed.
  pub async fn clear_stored_documents(&self) -> StoreResult<usize> {
    self.sync.reset_all_offline_flags();
    let removed = self.content.clear_all().await?;
    info!("Cleared {} offline documents", removed);
    Ok(removed)
  }

  /// Approximate space used by the metadata cache.
  pub async fn get_storage_usage(&self) -> StoreResult<StorageUsage> {
    self.layer.store().usage()
  }

  /// Metadata of every payload in offline storage.
  pub async fn stored_documents(&self) -> StoreResult<Vec<ContentMetadata>> {
    self.content.list().await
  }

  /// Drop every cached metadata entry. Offline payloads are kept.
  pub fn purge_metadata(&self) -> StoreResult<usize> {
    self.layer.store().clear()
  }
}
