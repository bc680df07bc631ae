//! Cache keys for document data.

use super::types::DocumentFilters;

/// Prefix shared by every cached document list
pub const LIST_PREFIX: &str = "documents:";
/// Prefix shared by every cached single document
pub const DOCUMENT_PREFIX: &str = "document:";

/// Query key types for document API calls.
#[derive(Clone, Debug)]
pub enum DocumentQueryKey<'a> {
  /// List documents matching filters
  List(&'a DocumentFilters),
  /// Get a single document by id
  Detail(&'a str),
}

impl DocumentQueryKey<'_> {
  /// Logical key inside the metadata cache namespace.
  pub fn cache_key(&self) -> String {
    match self {
      Self::List(filters) => {
        // Filters only hold strings and enums; serializing cannot fail
        let serialized = serde_json::to_string(filters).unwrap_or_else(|_| "{}".to_string());
        format!("{}{}", LIST_PREFIX, serialized)
      }
      Self::Detail(id) => format!("{}{}", DOCUMENT_PREFIX, id),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::List(filters) if **filters == DocumentFilters::default() => "all documents".to_string(),
      Self::List(_) => "filtered documents".to_string(),
      Self::Detail(id) => format!("document {}", id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::documents::types::DocumentStatus;

  #[test]
  fn test_list_key_serializes_filters() {
    let empty = DocumentFilters::default();
    assert_eq!(DocumentQueryKey::List(&empty).cache_key(), "documents:{}");

    let filters = DocumentFilters {
      status: Some(DocumentStatus::Approved),
      search: Some("math".to_string()),
      doc_type: None,
    };
    assert_eq!(
      DocumentQueryKey::List(&filters).cache_key(),
      r#"documents:{"status":"approved","search":"math"}"#
    );
  }

  #[test]
  fn test_detail_key_does_not_match_list_prefix() {
    let key = DocumentQueryKey::Detail("42").cache_key();
    assert_eq!(key, "document:42");
    assert!(!key.starts_with(LIST_PREFIX));
  }

  #[test]
  fn test_detail_keys_never_alias_list_keys() {
    let empty = DocumentFilters::default();
    let list_key = DocumentQueryKey::List(&empty).cache_key();
    for id in ["s_{}", "s:{}", "s{}", ":{}"] {
      let key = DocumentQueryKey::Detail(id).cache_key();
      assert_ne!(key, list_key, "id {}", id);
      assert!(!key.starts_with(LIST_PREFIX), "id {}", id);
    }
  }

  #[test]
  fn test_description() {
    let empty = DocumentFilters::default();
    assert_eq!(DocumentQueryKey::List(&empty).description(), "all documents");
    assert_eq!(DocumentQueryKey::Detail("7").description(), "document 7");
  }
}
