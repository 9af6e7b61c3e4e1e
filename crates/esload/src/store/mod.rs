//! The three-operation contract against the document store.
//!
//! The pipeline depends only on [`DocumentStore`]: delete an index, create
//! an index, write a batch of documents and learn each document's fate. The
//! Elasticsearch implementation lives in [`elastic`]; tests substitute an
//! in-memory store.

use async_trait::async_trait;
use thiserror::Error;
use url::ParseError;

use crate::pipeline::Document;

mod elastic;

pub use elastic::ElasticClient;

/// Outcome of one document inside a bulk write, in submission order.
#[derive(Debug, Clone)]
pub struct DocWriteStatus {
    pub id: String,
    /// `None` when the document was indexed; otherwise the store's reason.
    pub error: Option<String>,
}

impl DocWriteStatus {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: None,
        }
    }

    pub fn rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store URL `{host}`: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to initialize HTTP client: {0}")]
    Init(#[source] reqwest::Error),
    #[error("request error during `{operation}`: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected HTTP status {status} during `{operation}`")]
    HttpStatus {
        operation: &'static str,
        status: u16,
    },
    #[error("failed to decode `{operation}` response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("bulk response listed {got} items for {sent} submitted documents")]
    ItemCountMismatch { sent: usize, got: usize },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient faults are worth retrying: connection problems, timeouts,
    /// overload responses. Protocol and decode faults are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

/// Wire contract consumed by the bulk loader.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Startup reachability probe; failure aborts before any input is read.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Delete the index. Deleting a nonexistent index is success.
    async fn delete_index(&self, index: &str) -> Result<(), StoreError>;

    /// Create the index. An already-existing index is success.
    async fn create_index(&self, index: &str) -> Result<(), StoreError>;

    /// Write one batch, returning a status per document in submission order.
    async fn bulk_write(
        &self,
        index: &str,
        documents: &[Document],
    ) -> Result<Vec<DocWriteStatus>, StoreError>;
}
