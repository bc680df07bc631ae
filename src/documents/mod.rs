pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod placeholder;
pub mod sync;
pub mod types;

pub use cached_client::{CacheSettings, DocumentCache};
pub use client::HttpDocumentApi;
pub use types::{DocumentFilters, DocumentRecord, DocumentStatus};
