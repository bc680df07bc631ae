//! Built-in documents served when the API is unreachable.

use super::types::{DocumentFilters, DocumentRecord, DocumentStatus};

fn record(
  id: &str,
  title: &str,
  description: &str,
  doc_type: &str,
  size: u64,
  status: DocumentStatus,
  date: &str,
) -> DocumentRecord {
  DocumentRecord {
    id: id.to_string(),
    title: title.to_string(),
    description: description.to_string(),
    doc_type: doc_type.to_string(),
    size,
    status,
    file_name: None,
    created_at: date.to_string(),
    updated_at: date.to_string(),
    is_available_offline: false,
  }
}

/// The fixed placeholder set.
pub fn placeholder_documents() -> Vec<DocumentRecord> {
  vec![
    record(
      "placeholder-1",
      "Student Handbook",
      "School policies, code of conduct and contact information",
      "application/pdf",
      245_760,
      DocumentStatus::Approved,
      "2024-01-15T09:00:00Z",
    ),
    record(
      "placeholder-2",
      "Academic Calendar",
      "Term dates, holidays and examination periods",
      "application/pdf",
      102_400,
      DocumentStatus::Approved,
      "2024-02-01T09:00:00Z",
    ),
    record(
      "placeholder-3",
      "Enrollment Form",
      "Registration form awaiting administrator review",
      "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
      51_200,
      DocumentStatus::Pending,
      "2024-03-10T09:00:00Z",
    ),
  ]
}

/// Placeholder documents narrowed by `filters`.
///
/// Falls back to the whole set when nothing matches, so callers never get an
/// empty placeholder list.
pub fn placeholder_list(filters: &DocumentFilters) -> Vec<DocumentRecord> {
  let all = placeholder_documents();
  let search = filters.search.as_deref().map(str::to_lowercase);

  let matching: Vec<DocumentRecord> = all
    .iter()
    .filter(|doc| filters.status.map_or(true, |s| doc.status == s))
    .filter(|doc| filters.doc_type.as_deref().map_or(true, |t| doc.doc_type == t))
    .filter(|doc| {
      search.as_deref().map_or(true, |q| {
        doc.title.to_lowercase().contains(q) || doc.description.to_lowercase().contains(q)
      })
    })
    .cloned()
    .collect();

  if matching.is_empty() {
    all
  } else {
    matching
  }
}

pub fn placeholder_document(id: &str) -> Option<DocumentRecord> {
  placeholder_documents().into_iter().find(|doc| doc.id == id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_placeholder_set_is_non_empty_and_offline_free() {
    let docs = placeholder_documents();
    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| !d.is_available_offline));
  }

  #[test]
  fn test_filters_narrow_but_never_empty() {
    let pending = DocumentFilters {
      status: Some(DocumentStatus::Pending),
      ..Default::default()
    };
    let docs = placeholder_list(&pending);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "placeholder-3");

    let nothing = DocumentFilters {
      search: Some("zzz".to_string()),
      ..Default::default()
    };
    assert_eq!(placeholder_list(&nothing).len(), 3);
  }

  #[test]
  fn test_lookup_by_id() {
    assert!(placeholder_document("placeholder-2").is_some());
    assert!(placeholder_document("missing").is_none());
  }
}
