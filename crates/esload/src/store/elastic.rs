//! Elasticsearch REST implementation of the store contract.
//!
//! Four endpoints: `GET /` (ping), `DELETE /{index}` (404 tolerated),
//! `PUT /{index}` (already-exists tolerated) and `POST /{index}/_bulk` with
//! an NDJSON body of alternating action and source lines.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::pipeline::Document;

use super::{DocWriteStatus, DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: Client,
    base: Url,
}

impl ElasticClient {
    /// `host` must carry a scheme (see `config::normalize_host`).
    pub fn new(host: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(host).map_err(|source| StoreError::InvalidHost {
            host: host.to_string(),
            source,
        })?;
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(StoreError::Init)?;
        Ok(Self { http, base })
    }

    fn index_url(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|source| StoreError::InvalidHost {
                host: format!("{}/{path}", self.base),
                source,
            })
    }
}

#[async_trait]
impl DocumentStore for ElasticClient {
    async fn ping(&self) -> Result<(), StoreError> {
        let operation = "ping";
        let response = self
            .http
            .get(self.base.clone())
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation, source })?;
        if !response.status().is_success() {
            return Err(StoreError::HttpStatus {
                operation,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let operation = "delete_index";
        let url = self.index_url(index)?;
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation, source })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(index, "index not found during delete; treating as success");
                Ok(())
            }
            status => Err(StoreError::HttpStatus {
                operation,
                status: status.as_u16(),
            }),
        }
    }

    async fn create_index(&self, index: &str) -> Result<(), StoreError> {
        let operation = "create_index";
        let url = self.index_url(index)?;
        let response = self
            .http
            .put(url)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation, source })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::BAD_REQUEST {
            let body = response
                .text()
                .await
                .map_err(|source| StoreError::Transport { operation, source })?;
            if is_already_exists(&body) {
                debug!(index, "index already exists; treating create as success");
                return Ok(());
            }
        }
        Err(StoreError::HttpStatus {
            operation,
            status: status.as_u16(),
        })
    }

    async fn bulk_write(
        &self,
        index: &str,
        documents: &[Document],
    ) -> Result<Vec<DocWriteStatus>, StoreError> {
        let operation = "bulk";
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.index_url(&format!("{index}/_bulk"))?;
        let body = bulk_body(documents).map_err(|source| StoreError::Decode { operation, source })?;

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::HttpStatus {
                operation,
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|source| StoreError::Transport { operation, source })?;
        let parsed: BulkResponse = serde_json::from_str(&text)
            .map_err(|source| StoreError::Decode { operation, source })?;

        if parsed.items.len() != documents.len() {
            return Err(StoreError::ItemCountMismatch {
                sent: documents.len(),
                got: parsed.items.len(),
            });
        }

        Ok(parsed
            .items
            .into_iter()
            .map(|item| item.index.into_status())
            .collect())
    }
}

/// NDJSON framing for `_bulk`: one action line and one source line per
/// document, trailing newline included.
fn bulk_body(documents: &[Document]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_id": doc.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.fields)?);
        body.push('\n');
    }
    Ok(body)
}

fn is_already_exists(body: &str) -> bool {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        kind: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.kind == "resource_already_exists_exception",
        Err(_) => body.contains("resource_already_exists_exception"),
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    index: BulkItemStatus,
}

#[derive(Debug, Deserialize)]
struct BulkItemStatus {
    #[serde(rename = "_id")]
    id: String,
    status: u16,
    error: Option<BulkItemError>,
}

impl BulkItemStatus {
    fn into_status(self) -> DocWriteStatus {
        match self.error {
            None if (200..300).contains(&self.status) => DocWriteStatus::ok(self.id),
            None => DocWriteStatus::rejected(self.id, format!("HTTP {}", self.status)),
            Some(err) => {
                let reason = match err.reason {
                    Some(reason) => format!("{}: {reason}", err.kind),
                    None => err.kind,
                };
                DocWriteStatus::rejected(self.id, reason)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(rename = "type")]
    kind: String,
    reason: Option<String>,
}
