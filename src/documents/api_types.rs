//! Serde-deserializable types matching the document API responses.
//!
//! These types are separate from domain types to allow lenient deserialization
//! while keeping domain types focused on what the cache stores.

use serde::{Deserialize, Deserializer};

use super::types::{DocumentRecord, DocumentStatus};

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Id {
    Text(String),
    Number(i64),
  }

  Ok(match Id::deserialize(deserializer)? {
    Id::Text(s) => s,
    Id::Number(n) => n.to_string(),
  })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDocument {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(default, alias = "name")]
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default, rename = "type", alias = "mimeType", alias = "contentType")]
  pub doc_type: Option<String>,
  #[serde(default, alias = "fileSize")]
  pub size: Option<u64>,
  #[serde(default)]
  pub status: Option<DocumentStatus>,
  #[serde(default, alias = "file_name", alias = "filename")]
  pub file_name: Option<String>,
  #[serde(default, alias = "created_at")]
  pub created_at: Option<String>,
  #[serde(default, alias = "updated_at")]
  pub updated_at: Option<String>,
}

impl ApiDocument {
  /// Convert to the cached record. Offline availability is filled in later.
  pub fn into_record(self) -> DocumentRecord {
    let created_at = self.created_at.unwrap_or_default();
    let updated_at = self.updated_at.unwrap_or_else(|| created_at.clone());
    DocumentRecord {
      id: self.id,
      title: self.title,
      description: self.description.unwrap_or_default(),
      doc_type: self
        .doc_type
        .unwrap_or_else(|| "application/octet-stream".to_string()),
      size: self.size.unwrap_or(0),
      status: self.status.unwrap_or(DocumentStatus::Pending),
      file_name: self.file_name,
      created_at,
      updated_at,
      is_available_offline: false,
    }
  }
}

/// List endpoint body: either a bare array or an envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiDocumentList {
  Bare(Vec<ApiDocument>),
  Data { data: Vec<ApiDocument> },
  Documents { documents: Vec<ApiDocument> },
}

impl ApiDocumentList {
  pub fn into_records(self) -> Vec<DocumentRecord> {
    let items = match self {
      ApiDocumentList::Bare(items) => items,
      ApiDocumentList::Data { data } => data,
      ApiDocumentList::Documents { documents } => documents,
    };
    items.into_iter().map(ApiDocument::into_record).collect()
  }
}

/// Single-document endpoint body: the object itself or `{ "data": {...} }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiDocumentBody {
  Data { data: ApiDocument },
  Bare(ApiDocument),
}

impl ApiDocumentBody {
  pub fn into_record(self) -> DocumentRecord {
    match self {
      ApiDocumentBody::Data { data } => data.into_record(),
      ApiDocumentBody::Bare(doc) => doc.into_record(),
    }
  }
}
