use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cache::ContentMetadata;

/// Review state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
  Pending,
  Approved,
  Rejected,
}

impl DocumentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DocumentStatus::Pending => "pending",
      DocumentStatus::Approved => "approved",
      DocumentStatus::Rejected => "rejected",
    }
  }
}

impl std::str::FromStr for DocumentStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "pending" => Ok(DocumentStatus::Pending),
      "approved" => Ok(DocumentStatus::Approved),
      "rejected" => Ok(DocumentStatus::Rejected),
      other => Err(format!("unknown document status '{}'", other)),
    }
  }
}

/// Document metadata as cached and shown in lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "type")]
  pub doc_type: String,
  pub size: u64,
  pub status: DocumentStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_name: Option<String>,
  pub created_at: String,
  pub updated_at: String,
  /// Derived locally from the durable store, never taken from the server
  #[serde(default)]
  pub is_available_offline: bool,
}

/// Filters for the document list endpoint.
///
/// Serialized to JSON to form the list cache key, so field order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<DocumentStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub doc_type: Option<String>,
}

/// Partial document update merged into cached snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_available_offline: Option<bool>,
}

impl DocumentPatch {
  pub fn offline(available: bool) -> Self {
    Self {
      is_available_offline: Some(available),
    }
  }
}

/// Raw payload returned by the download endpoint
#[derive(Debug, Clone)]
pub struct RemoteContent {
  pub bytes: Bytes,
  pub content_type: String,
  pub file_name: Option<String>,
}

/// Result of a user-initiated download
#[derive(Debug, Clone)]
pub struct DownloadedDocument {
  pub bytes: Bytes,
  pub metadata: ContentMetadata,
  /// Whether the bytes are now in the durable store
  pub stored: bool,
  /// Whether the bytes were served from the durable store
  pub from_store: bool,
}
