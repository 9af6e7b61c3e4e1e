//! End-to-end load runs against an in-memory document store.
//!
//! The store records every call and supports injectable per-document
//! rejections and fail-N-calls transport faults, so the tests cover the
//! partial-failure and retry paths without a network.

use std::collections::HashSet;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use esload::config::LoadConfig;
use esload::ingestion::RecordError;
use esload::loader::{run_load, LoadError};
use esload::pipeline::Document;
use esload::store::{DocWriteStatus, DocumentStore, StoreError};

#[derive(Default)]
struct MockStore {
    deletes: Mutex<Vec<String>>,
    creates: Mutex<Vec<String>>,
    batches: Mutex<Vec<Vec<Document>>>,
    bulk_calls: AtomicUsize,
    reject_ids: HashSet<String>,
    fail_bulk_calls: HashSet<usize>,
    fail_delete: bool,
    fail_ping: bool,
}

impl MockStore {
    fn indexed_batches(&self) -> Vec<Vec<Document>> {
        self.batches.lock().unwrap().clone()
    }

    fn indexed_ids(&self) -> Vec<String> {
        let mut batches = self.indexed_batches();
        batches.sort_by_key(|batch| {
            batch
                .first()
                .and_then(|doc| doc.id.parse::<u64>().ok())
                .unwrap_or(u64::MAX)
        });
        batches
            .into_iter()
            .flatten()
            .map(|doc| doc.id)
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_ping {
            return Err(StoreError::Unavailable("ping refused".into()));
        }
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        if self.fail_delete {
            return Err(StoreError::HttpStatus {
                operation: "delete_index",
                status: 403,
            });
        }
        self.deletes.lock().unwrap().push(index.to_string());
        Ok(())
    }

    async fn create_index(&self, index: &str) -> Result<(), StoreError> {
        self.creates.lock().unwrap().push(index.to_string());
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &str,
        documents: &[Document],
    ) -> Result<Vec<DocWriteStatus>, StoreError> {
        assert_eq!(index, "test-index");
        let call = self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk_calls.contains(&call) {
            return Err(StoreError::Unavailable("injected transport fault".into()));
        }

        self.batches.lock().unwrap().push(documents.to_vec());
        Ok(documents
            .iter()
            .map(|doc| {
                if self.reject_ids.contains(&doc.id) {
                    DocWriteStatus::rejected(&doc.id, "mapper_parsing_exception: bad field")
                } else {
                    DocWriteStatus::ok(&doc.id)
                }
            })
            .collect())
    }
}

fn write_input(extension: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config(input: &Path) -> LoadConfig {
    LoadConfig {
        input_file: input.to_path_buf(),
        index_name: "test-index".to_string(),
        host: "http://localhost:9200".to_string(),
        id_field: None,
        id_start_from: 1,
        delete_index_first: false,
        batch_size: NonZeroUsize::new(500).unwrap(),
        workers: NonZeroUsize::new(1).unwrap(),
        request_timeout: Duration::from_secs(1),
        retry_attempts: 3,
    }
}

#[tokio::test]
async fn csv_rows_become_counter_documents() {
    let input = write_input("csv", "name,age\nAnn,30\nBo,25\n");
    let store = Arc::new(MockStore::default());

    let summary = run_load(&config(input.path()), Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.fully_successful());

    let batches = store.indexed_batches();
    assert_eq!(batches.len(), 1);
    let docs = &batches[0];
    assert_eq!(docs[0].id, "1");
    assert_eq!(docs[0].fields["name"], serde_json::json!("Ann"));
    assert_eq!(docs[0].fields["age"], serde_json::json!("30"));
    assert_eq!(docs[1].id, "2");
    assert_eq!(docs[1].fields["name"], serde_json::json!("Bo"));
    assert_eq!(docs[1].fields["age"], serde_json::json!("25"));
}

#[tokio::test]
async fn ndjson_bad_line_is_skipped_and_reported() {
    let input = write_input("json", "{\"name\":\"Ann\"}\n{not valid json}\n");
    let store = Arc::new(MockStore::default());

    let summary = run_load(&config(input.path()), Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(summary.records_read(), 2);
    assert!(!summary.fully_successful());
    assert_eq!(summary.record_failures.len(), 1);
    assert_eq!(summary.record_failures[0].line, 2);
    assert!(summary.record_failures[0].reason.contains("line 2"));

    assert_eq!(store.indexed_ids(), ["1"]);
}

#[tokio::test]
async fn designated_id_field_is_promoted() {
    let input = write_input(
        "json",
        "{\"uid\":\"a1\",\"name\":\"Ann\"}\n{\"name\":\"NoId\"}\n{\"uid\":7,\"name\":\"Bo\"}\n",
    );
    let store = Arc::new(MockStore::default());
    let mut cfg = config(input.path());
    cfg.id_field = Some("uid".to_string());

    let summary = run_load(&cfg, Arc::clone(&store)).await.unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.skipped_records, 1);
    assert!(summary.record_failures[0].reason.contains("uid"));

    let docs: Vec<Document> = store.indexed_batches().into_iter().flatten().collect();
    assert_eq!(docs[0].id, "a1");
    assert!(!docs[0].fields.contains_key("uid"));
    assert_eq!(docs[1].id, "7");
}

#[tokio::test]
async fn counter_seed_is_honored() {
    let input = write_input("csv", "name\nAnn\nBo\n");
    let store = Arc::new(MockStore::default());
    let mut cfg = config(input.path());
    cfg.id_start_from = 100;

    run_load(&cfg, Arc::clone(&store)).await.unwrap();
    assert_eq!(store.indexed_ids(), ["100", "101"]);
}

#[tokio::test]
async fn unsupported_extension_aborts_before_store_calls() {
    let input = write_input("parquet", "whatever");
    let store = Arc::new(MockStore::default());
    let mut cfg = config(input.path());
    cfg.delete_index_first = true;

    let err = run_load(&cfg, Arc::clone(&store)).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::Records(RecordError::UnsupportedFormat { .. })
    ));
    assert!(store.deletes.lock().unwrap().is_empty());
    assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_index_first_resets_then_loads() {
    let input = write_input("csv", "name\nAnn\n");
    let store = Arc::new(MockStore::default());
    let mut cfg = config(input.path());
    cfg.delete_index_first = true;

    let summary = run_load(&cfg, Arc::clone(&store)).await.unwrap();

    assert_eq!(*store.deletes.lock().unwrap(), ["test-index"]);
    assert_eq!(*store.creates.lock().unwrap(), ["test-index"]);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn failed_index_reset_is_fatal() {
    let input = write_input("csv", "name\nAnn\n");
    let store = Arc::new(MockStore {
        fail_delete: true,
        ..MockStore::default()
    });
    let mut cfg = config(input.path());
    cfg.delete_index_first = true;

    let err = run_load(&cfg, Arc::clone(&store)).await.unwrap_err();
    assert!(matches!(err, LoadError::IndexReset(_)));
    assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_store_is_fatal() {
    let input = write_input("csv", "name\nAnn\n");
    let store = Arc::new(MockStore {
        fail_ping: true,
        ..MockStore::default()
    });

    let err = run_load(&config(input.path()), Arc::clone(&store))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Unreachable(_)));
}

#[tokio::test]
async fn per_document_rejection_does_not_abort() {
    let input = write_input("csv", "name\nAnn\nBo\nCy\n");
    let store = Arc::new(MockStore {
        reject_ids: HashSet::from(["2".to_string()]),
        ..MockStore::default()
    });

    let summary = run_load(&config(input.path()), Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.doc_failures.len(), 1);
    assert_eq!(summary.doc_failures[0].id, "2");
    assert!(summary.doc_failures[0].reason.contains("mapper_parsing_exception"));
}

#[tokio::test]
async fn transient_fault_is_retried_to_success() {
    let input = write_input("csv", "name\nAnn\nBo\n");
    let store = Arc::new(MockStore {
        fail_bulk_calls: HashSet::from([0]),
        ..MockStore::default()
    });

    let summary = run_load(&config(input.path()), Arc::clone(&store))
        .await
        .unwrap();

    assert!(summary.fully_successful());
    assert_eq!(summary.succeeded, 2);
    assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_downgrade_to_document_failures() {
    let input = write_input("csv", "name\nAnn\nBo\n");
    // Batch 0 fails all three attempts; batch 1 (call 3) succeeds.
    let store = Arc::new(MockStore {
        fail_bulk_calls: HashSet::from([0, 1, 2]),
        ..MockStore::default()
    });
    let mut cfg = config(input.path());
    cfg.batch_size = NonZeroUsize::new(1).unwrap();

    let summary = run_load(&cfg, Arc::clone(&store)).await.unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.doc_failures[0].id, "1");
    assert!(summary.doc_failures[0].reason.contains("transport fault"));
    assert_eq!(store.indexed_ids(), ["2"]);
}

#[tokio::test]
async fn batching_preserves_order_across_workers() {
    let mut contents = String::from("name\n");
    for i in 0..12 {
        contents.push_str(&format!("person{i}\n"));
    }
    let input = write_input("csv", &contents);
    let store = Arc::new(MockStore::default());
    let mut cfg = config(input.path());
    cfg.batch_size = NonZeroUsize::new(2).unwrap();
    cfg.workers = NonZeroUsize::new(4).unwrap();

    let summary = run_load(&cfg, Arc::clone(&store)).await.unwrap();

    assert_eq!(summary.attempted, 12);
    assert_eq!(summary.succeeded, 12);

    let batches = store.indexed_batches();
    assert_eq!(batches.len(), 6);
    for batch in &batches {
        assert_eq!(batch.len(), 2);
        // counter ids within a batch stay consecutive
        let first: u64 = batch[0].id.parse().unwrap();
        let second: u64 = batch[1].id.parse().unwrap();
        assert_eq!(second, first + 1);
    }

    let expected: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
    assert_eq!(store.indexed_ids(), expected);
}

#[tokio::test]
async fn empty_input_completes_with_nothing_attempted() {
    let input = write_input("csv", "name,age\n");
    let store = Arc::new(MockStore::default());

    let summary = run_load(&config(input.path()), Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 0);
    assert!(summary.fully_successful());
    assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
}
