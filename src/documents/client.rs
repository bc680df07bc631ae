use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::api_types::{ApiDocumentBody, ApiDocumentList};
use super::types::{DocumentFilters, DocumentRecord, RemoteContent};

/// Failures talking to the document API or serving a download.
#[derive(Error, Debug)]
pub enum DocumentError {
  #[error("you are offline; connect to the network and try again")]
  Offline,

  #[error("document {0} downloaded with an empty body")]
  EmptyContent(String),

  #[error("request to {url} failed with status {status}")]
  Status { url: String, status: u16 },

  #[error("expected JSON from {url} but got '{content_type}'")]
  UnexpectedContentType { url: String, content_type: String },

  #[error("network error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("invalid API url: {0}")]
  Url(#[from] url::ParseError),
}

/// Network collaborator consumed by the document cache.
#[async_trait]
pub trait DocumentApi: Send + Sync {
  async fn fetch_document_list(
    &self,
    filters: &DocumentFilters,
  ) -> Result<Vec<DocumentRecord>, DocumentError>;

  async fn fetch_document(&self, id: &str) -> Result<DocumentRecord, DocumentError>;

  async fn fetch_document_bytes(&self, id: &str) -> Result<RemoteContent, DocumentError>;

  /// Environment signal used to short-circuit network-dependent operations.
  fn is_online(&self) -> bool;
}

/// Document API client over HTTP
pub struct HttpDocumentApi {
  client: Client,
  base_url: Url,
  token: Option<String>,
  online: AtomicBool,
}

impl HttpDocumentApi {
  pub fn new(
    base_url: &str,
    token: Option<String>,
    timeout: Duration,
    online: bool,
  ) -> Result<Self, DocumentError> {
    // Trailing slash so joins append instead of replacing the last segment
    let mut base_url = Url::parse(base_url)?;
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let client = Client::builder().timeout(timeout).build()?;

    Ok(Self {
      client,
      base_url,
      token,
      online: AtomicBool::new(online),
    })
  }

  #[cfg(test)]
  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::Relaxed);
  }

  fn endpoint(&self, path: &str) -> Result<Url, DocumentError> {
    Ok(self.base_url.join(path)?)
  }

  async fn get(&self, url: Url) -> Result<Response, DocumentError> {
    debug!("GET {}", url);
    let mut request = self.client.get(url.clone());
    if let Some(token) = &self.token {
      request = request.header(AUTHORIZATION, format!("Bearer {}", token));
    }

    let response = request.send().await?;
    if !response.status().is_success() {
      return Err(DocumentError::Status {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }
    Ok(response)
  }

  /// GET a JSON endpoint, rejecting anything not labelled as JSON.
  async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, DocumentError> {
    let response = self.get(url.clone()).await?;
    let content_type = header_str(response.headers(), CONTENT_TYPE.as_str()).unwrap_or_default();
    if !content_type.contains("json") {
      return Err(DocumentError::UnexpectedContentType {
        url: url.to_string(),
        content_type,
      });
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
  }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(|s| s.to_string())
}

/// Extract the file name from a `Content-Disposition` header value.
///
/// The name is reduced to a bare file name, see [`safe_file_name`].
pub fn disposition_file_name(value: &str) -> Option<String> {
  value
    .split(';')
    .map(str::trim)
    .find_map(|part| part.strip_prefix("filename="))
    .and_then(|name| safe_file_name(name.trim_matches('"')))
}

/// Reduce a server- or user-supplied name to its last path component.
///
/// Forward slashes and backslashes both count as separators. Empty names and
/// names starting with a dot (including `..`) are rejected.
pub fn safe_file_name(name: &str) -> Option<String> {
  let last = name.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
  if last.is_empty() || last.starts_with('.') || last.contains('\0') {
    return None;
  }
  Some(last.to_string())
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
  async fn fetch_document_list(
    &self,
    filters: &DocumentFilters,
  ) -> Result<Vec<DocumentRecord>, DocumentError> {
    let mut url = self.endpoint("documents")?;
    {
      let mut query = url.query_pairs_mut();
      if let Some(status) = filters.status {
        query.append_pair("status", status.as_str());
      }
      if let Some(search) = &filters.search {
        query.append_pair("search", search);
      }
      if let Some(doc_type) = &filters.doc_type {
        query.append_pair("type", doc_type);
      }
    }
    // An empty query still leaves a dangling '?'
    if url.query() == Some("") {
      url.set_query(None);
    }

    let list: ApiDocumentList = self.get_json(url).await?;
    Ok(list.into_records())
  }

  async fn fetch_document(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
    let url = self.endpoint(&format!("documents/{}", id))?;
    let body: ApiDocumentBody = self.get_json(url).await?;
    Ok(body.into_record())
  }

  async fn fetch_document_bytes(&self, id: &str) -> Result<RemoteContent, DocumentError> {
    let url = self.endpoint(&format!("documents/{}/download", id))?;
    let response = self.get(url).await?;

    let headers = response.headers();
    let content_type = header_str(headers, CONTENT_TYPE.as_str())
      .unwrap_or_else(|| "application/octet-stream".to_string());
    let file_name = header_str(headers, CONTENT_DISPOSITION.as_str())
      .as_deref()
      .and_then(disposition_file_name);

    let bytes = response.bytes().await?;
    Ok(RemoteContent {
      bytes,
      content_type,
      file_name,
    })
  }

  fn is_online(&self) -> bool {
    self.online.load(Ordering::Relaxed)
  }
}
