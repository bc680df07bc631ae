//! Fakes shared by unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::cache::Clock;
use crate::documents::client::{DocumentApi, DocumentError};
use crate::documents::types::{DocumentFilters, DocumentRecord, RemoteContent};

/// Clock that only moves when told to.
pub struct ManualClock {
  now: AtomicI64,
}

impl ManualClock {
  pub fn new(start: i64) -> Self {
    Self {
      now: AtomicI64::new(start),
    }
  }

  pub fn advance(&self, millis: i64) {
    self.now.fetch_add(millis, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_millis(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}

/// How the fake API should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
  None,
  /// Answers JSON endpoints with an HTML page
  NotJson,
  /// Answers every request with the given status
  Status(u16),
}

impl Failure {
  fn error(self, url: &str) -> Option<DocumentError> {
    match self {
      Failure::None => None,
      Failure::NotJson => Some(DocumentError::UnexpectedContentType {
        url: url.to_string(),
        content_type: "text/html".to_string(),
      }),
      Failure::Status(status) => Some(DocumentError::Status {
        url: url.to_string(),
        status,
      }),
    }
  }
}

/// In-memory stand-in for the document API.
pub struct FakeDocumentApi {
  documents: Mutex<Vec<DocumentRecord>>,
  contents: Mutex<HashMap<String, Bytes>>,
  failure: Mutex<Failure>,
  online: AtomicBool,
  pub list_calls: AtomicUsize,
  pub detail_calls: AtomicUsize,
  pub download_calls: AtomicUsize,
}

impl FakeDocumentApi {
  pub fn new(documents: Vec<DocumentRecord>) -> Self {
    Self {
      documents: Mutex::new(documents),
      contents: Mutex::new(HashMap::new()),
      failure: Mutex::new(Failure::None),
      online: AtomicBool::new(true),
      list_calls: AtomicUsize::new(0),
      detail_calls: AtomicUsize::new(0),
      download_calls: AtomicUsize::new(0),
    }
  }

  pub fn with_content(self, id: &str, body: impl Into<Bytes>) -> Self {
    self.contents.lock().unwrap().insert(id.to_string(), body.into());
    self
  }

  pub fn fail_with(&self, failure: Failure) {
    *self.failure.lock().unwrap() = failure;
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  fn check(&self, url: &str) -> Result<(), DocumentError> {
    match self.failure.lock().unwrap().error(url) {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl DocumentApi for FakeDocumentApi {
  async fn fetch_document_list(
    &self,
    filters: &DocumentFilters,
  ) -> Result<Vec<DocumentRecord>, DocumentError> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    self.check("/documents")?;
    let documents = self.documents.lock().unwrap();
    Ok(
      documents
        .iter()
        .filter(|d| filters.status.map_or(true, |s| d.status == s))
        .cloned()
        .collect(),
    )
  }

  async fn fetch_document(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
    self.detail_calls.fetch_add(1, Ordering::SeqCst);
    self.check("/documents/id")?;
    self
      .documents
      .lock()
      .unwrap()
      .iter()
      .find(|d| d.id == id)
      .cloned()
      .ok_or(DocumentError::Status {
        url: format!("/documents/{}", id),
        status: 404,
      })
  }

  async fn fetch_document_bytes(&self, id: &str) -> Result<RemoteContent, DocumentError> {
    self.download_calls.fetch_add(1, Ordering::SeqCst);
    self.check("/documents/id/download")?;
    let bytes = self
      .contents
      .lock()
      .unwrap()
      .get(id)
      .cloned()
      .ok_or(DocumentError::Status {
        url: format!("/documents/{}/download", id),
        status: 404,
      })?;
    Ok(RemoteContent {
      bytes,
      content_type: "application/pdf".to_string(),
      file_name: Some(format!("{}.pdf", id)),
    })
  }

  fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

/// Serve a fixed HTTP response on a local port until the test ends.
///
/// Returns a base URL with an `/api` path prefix.
pub async fn spawn_http_stub(
  status: u16,
  content_type: &'static str,
  body: &'static str,
) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  tokio::spawn(async move {
    while let Ok((mut socket, _)) = listener.accept().await {
      let mut buf = vec![0u8; 8192];
      let mut read = 0;
      // Headers only; the client never sends a body
      while read < buf.len() {
        match socket.read(&mut buf[read..]).await {
          Ok(0) | Err(_) => break,
          Ok(n) => read += n,
        }
        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
          break;
        }
      }

      let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
      );
      let _ = socket.write_all(response.as_bytes()).await;
      let _ = socket.shutdown().await;
    }
  });

  format!("http://{}/api", addr)
}
