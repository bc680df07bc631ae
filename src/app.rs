use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{
  CacheResult, CacheSource, ContentStore, KeyValueStorage, MemoryContentStore, MemoryStorage,
  MetadataStore, SqliteContentStore, SqliteStorage, SystemClock, UnavailableContentStore,
};
use crate::config::{Config, StorageKind};
use crate::documents::client::safe_file_name;
use crate::documents::{
  DocumentCache, DocumentFilters, DocumentRecord, DocumentStatus, HttpDocumentApi,
};

const METADATA_DB: &str = "metadata.db";
const CONTENT_DB: &str = "documents.db";

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List documents
  List {
    /// Only documents with this status (pending, approved, rejected)
    #[arg(long)]
    status: Option<DocumentStatus>,
    /// Free-text search
    #[arg(long)]
    search: Option<String>,
    /// Only documents of this type
    #[arg(long = "type")]
    doc_type: Option<String>,
    /// Bypass the cache
    #[arg(long)]
    refresh: bool,
  },
  /// Show a single document
  Show {
    id: String,
    #[arg(long)]
    refresh: bool,
  },
  /// Download a document and keep it for offline use
  Download {
    id: String,
    /// Where to write the file (default: the document's file name)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List documents available offline
  Stored,
  /// Remove the offline copy of a document
  Remove { id: String },
  /// Remove every offline copy
  Clear,
  /// Show metadata cache usage
  Usage,
  /// Drop all cached metadata, keeping offline copies
  Purge,
}

pub struct App {
  documents: DocumentCache,
}

impl App {
  pub fn new(config: &Config, api_url: Option<&str>, offline: bool) -> Result<Self> {
    let url = config.api_url(api_url)?;
    let api = HttpDocumentApi::new(
      &url,
      Config::get_api_token(),
      config.request_timeout(),
      !(offline || config.api.offline),
    )?;

    let cache = &config.cache;
    let storage: Arc<dyn KeyValueStorage>;
    let content: Arc<dyn ContentStore>;
    match cache.storage {
      StorageKind::Memory => {
        storage = Arc::new(MemoryStorage::new(cache.capacity_bytes));
        content = Arc::new(MemoryContentStore::new());
      }
      StorageKind::Sqlite => {
        let dir = cache.data_dir()?;
        std::fs::create_dir_all(&dir)
          .map_err(|e| eyre!("Failed to create data directory {}: {}", dir.display(), e))?;
        storage = Arc::new(SqliteStorage::open(&dir.join(METADATA_DB), cache.capacity_bytes)?);
        content = open_content_store(&dir.join(CONTENT_DB));
      }
    }

    let metadata = MetadataStore::new(storage, Arc::new(SystemClock), cache.eviction_policy());
    info!("Using document API at {}", url);

    Ok(Self {
      documents: DocumentCache::new(Arc::new(api), metadata, content, cache.settings()),
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::List {
        status,
        search,
        doc_type,
        refresh,
      } => {
        let filters = DocumentFilters {
          status,
          search,
          doc_type,
        };
        let result = self.documents.get_documents(&filters, refresh).await;
        println!("{}", source_line(&result));
        for doc in &result.data {
          println!("{}", format_row(doc));
        }
      }
      Command::Show { id, refresh } => {
        let result = self
          .documents
          .get_document(&id, refresh)
          .await
          .ok_or_else(|| eyre!("Document {} not found", id))?;
        println!("{}", source_line(&result));
        print_details(&result.data);
      }
      Command::Download { id, output } => {
        let downloaded = self.documents.download_and_store_document(&id).await?;
        let path = output.unwrap_or_else(|| default_output_path(&downloaded.metadata.name, &id));
        tokio::fs::write(&path, &downloaded.bytes)
          .await
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;

        let note = if downloaded.from_store {
          "from offline storage"
        } else if downloaded.stored {
          "saved for offline use"
        } else {
          "not saved for offline use"
        };
        println!(
          "Wrote {} ({}) to {}, {}",
          downloaded.metadata.name,
          format_size(downloaded.metadata.size),
          path.display(),
          note
        );
      }
      Command::Stored => {
        let stored = self.documents.stored_documents().await?;
        if stored.is_empty() {
          println!("No documents stored for offline use");
        }
        for meta in stored {
          println!("{:<24} {:>10}  {}", meta.id, format_size(meta.size), meta.name);
        }
      }
      Command::Remove { id } => {
        self.documents.remove_stored_document(&id).await?;
        println!("Removed offline copy of {}", id);
      }
      Command::Clear => {
        let removed = self.documents.clear_stored_documents().await?;
        println!("Removed {} offline documents", removed);
      }
      Command::Usage => {
        let usage = self.documents.get_storage_usage().await?;
        println!(
          "{} of {} used ({:.1}%)",
          format_size(usage.used_bytes),
          format_size(usage.total_estimated_bytes),
          usage.percentage
        );
      }
      Command::Purge => {
        let removed = self.documents.purge_metadata()?;
        println!("Dropped {} cached entries", removed);
      }
    }
    Ok(())
  }
}

/// Open the durable store, degrading to online-only when it cannot be opened.
fn open_content_store(path: &std::path::Path) -> Arc<dyn ContentStore> {
  match SqliteContentStore::open(path) {
    Ok(store) => Arc::new(store),
    Err(e) => {
      warn!(
        "Offline storage at {} unavailable, continuing without it: {}",
        path.display(),
        e
      );
      Arc::new(UnavailableContentStore)
    }
  }
}

/// File name in the working directory for a download without `--output`.
///
/// Stored names come from the server, so only their last component is used.
fn default_output_path(name: &str, id: &str) -> PathBuf {
  let file_name = safe_file_name(name)
    .or_else(|| safe_file_name(id))
    .unwrap_or_else(|| "document".to_string());
  PathBuf::from(file_name)
}

fn source_line<T>(result: &CacheResult<T>) -> String {
  match (result.source, result.cached_at) {
    (CacheSource::Cache, Some(at)) => format!("[cache, saved {}]", at.format("%Y-%m-%d %H:%M")),
    (CacheSource::Placeholder, _) => {
      "[placeholder data, the server could not be reached]".to_string()
    }
    (source, _) => format!("[{}]", source),
  }
}

fn format_row(doc: &DocumentRecord) -> String {
  let offline = if doc.is_available_offline { "*" } else { " " };
  format!(
    "{} {:<24} {:<9} {:>10}  {}",
    offline,
    doc.id,
    doc.status.as_str(),
    format_size(doc.size),
    doc.title
  )
}

fn print_details(doc: &DocumentRecord) {
  println!("ID:          {}", doc.id);
  println!("Title:       {}", doc.title);
  println!("Type:        {}", doc.doc_type);
  println!("Status:      {}", doc.status.as_str());
  println!("Size:        {}", format_size(doc.size));
  println!("Created:     {}", doc.created_at);
  println!("Updated:     {}", doc.updated_at);
  println!(
    "Offline:     {}",
    if doc.is_available_offline { "yes" } else { "no" }
  );
  if !doc.description.is_empty() {
    println!();
    println!("{}", doc.description);
  }
}

fn format_size(bytes: u64) -> String {
  const KIB: f64 = 1024.0;
  let b = bytes as f64;
  if b < KIB {
    format!("{} B", bytes)
  } else if b < KIB * KIB {
    format!("{:.1} KiB", b / KIB)
  } else {
    format!("{:.1} MiB", b / (KIB * KIB))
  }
}
