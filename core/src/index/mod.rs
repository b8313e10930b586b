//! The search backend that holds one document per stored chunk, and the
//! indexer factories that decide how those documents are mapped and queried.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::metadata::UpdateScript;

pub use self::{
    document::ChunkDocument,
    factory::{IndexerCategory, IndexerFactory, IndexerRegistry, MatchPriority},
    generic_attribute_indexer::GenericAttributeIndexerFactory,
    memory::MemoryIndexBackend,
    meta_indexer::MetaIndexerFactory,
    value::Value,
};

pub mod document;
pub mod factory;
pub mod generic_attribute_indexer;
pub mod memory;
pub mod meta_indexer;
pub mod value;

/// Errors reported by an [`IndexBackend`]
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend could not be reached or rejected the request
    #[error("backend request failed with status {status}: {message}")]
    Transport { status: u16, message: String },

    /// The scroll context does not exist (anymore)
    #[error("scroll `{0}' has expired")]
    ScrollExpired(String),

    #[error("malformed backend response")]
    MalformedResponse(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// A rejected request, e.g. a filter the backend does not understand
    pub fn bad_request(message: impl Into<String>) -> Self {
        BackendError::Transport {
            status: 400,
            message: message.into(),
        }
    }
}

/// A document matched by a scroll query
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// The document ID, i.e. the chunk path
    pub id: String,
    pub source: serde_json::Value,
}

/// One page of a scroll query
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollResponse {
    pub hits: Vec<Hit>,

    /// The total number of documents matched by the query
    pub total_hits: u64,

    /// The token to pass to [`IndexBackend::continue_scroll`]
    pub scroll_id: Option<String>,
}

/// The result of [`IndexBackend::update_by_query`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateByQueryResponse {
    /// Absence of this flag is treated as a timeout
    #[serde(default = "default_timed_out")]
    pub timed_out: bool,

    #[serde(default)]
    pub total: Option<u64>,

    #[serde(default)]
    pub updated: Option<u64>,
}

fn default_timed_out() -> bool {
    true
}

/// Render a scroll TTL the way the backend expects it (e.g. `1m`)
pub fn format_ttl(ttl: Duration) -> String {
    humantime::format_duration(ttl).to_string()
}

/// Access to the external document-search backend
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Create the index if it does not exist yet
    async fn ensure_index(&self) -> Result<(), BackendError>;

    /// Merge the given mapping into the mapping of the given document type
    async fn put_mapping(
        &self,
        type_name: &str,
        mapping: &serde_json::Value,
    ) -> Result<(), BackendError>;

    /// Open a scroll over all documents matching `query` (all documents if
    /// `None`) and `post_filter`. Returns the first page.
    async fn begin_scroll(
        &self,
        type_name: &str,
        query: Option<&serde_json::Value>,
        post_filter: &serde_json::Value,
        size: usize,
        ttl: Duration,
    ) -> Result<ScrollResponse, BackendError>;

    /// Fetch the next page of an open scroll. An empty page means the scroll
    /// is exhausted. Fails with [`BackendError::ScrollExpired`] if the
    /// scroll's TTL has passed.
    async fn continue_scroll(
        &self,
        scroll_id: &str,
        ttl: Duration,
    ) -> Result<ScrollResponse, BackendError>;

    /// Apply `script` to all documents matching `post_filter` in one request
    async fn update_by_query(
        &self,
        type_name: &str,
        post_filter: &serde_json::Value,
        script: &UpdateScript,
    ) -> Result<UpdateByQueryResponse, BackendError>;

    /// Add or replace documents. Each document is given with its ID.
    async fn add_documents(
        &self,
        type_name: &str,
        documents: Vec<(String, serde_json::Value)>,
    ) -> Result<(), BackendError>;

    async fn delete_documents(&self, type_name: &str, ids: &[String])
        -> Result<(), BackendError>;
}
