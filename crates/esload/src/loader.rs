//! Bulk load orchestration: parse, assign ids, batch, write, summarize.
//!
//! One run is a fixed sequence: ping the store, optionally reset the index,
//! then stream the input through id assignment and batching into a bounded
//! channel consumed by a small pool of bulk-write workers. Only fatal faults
//! (unsupported format, failed reset, unreachable store, input I/O) abort;
//! per-record and per-document faults are captured in the [`LoadSummary`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::LoadConfig;
use crate::ingestion::{RecordError, RecordFormat, RecordReader};
use crate::pipeline::{batched, Document, IdAssigner};
use crate::store::{DocumentStore, StoreError};

const RETRY_MIN_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Records(#[from] RecordError),
    #[error("store unreachable at startup: {0}")]
    Unreachable(#[source] StoreError),
    #[error("index reset failed: {0}")]
    IndexReset(#[source] StoreError),
    #[error("batch channel closed unexpectedly")]
    ChannelClosed,
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A per-record fault: the record was skipped, the run continued.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    /// Physical input line, 0 when unknown.
    pub line: u64,
    pub reason: String,
}

/// A per-document write fault reported by the store.
#[derive(Debug, Clone)]
pub struct DocFailure {
    pub id: String,
    pub reason: String,
}

/// Accumulated outcome of one run. `attempted == succeeded + failed`, and
/// `attempted` equals the number of input records minus `skipped_records`.
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_records: usize,
    pub record_failures: Vec<RecordFailure>,
    pub doc_failures: Vec<DocFailure>,
}

impl LoadSummary {
    /// Number of records read from the input, well-formed or not.
    pub fn records_read(&self) -> usize {
        self.attempted + self.skipped_records
    }

    pub fn fully_successful(&self) -> bool {
        self.failed == 0 && self.skipped_records == 0
    }
}

/// Run one load end to end against `store`.
pub async fn run_load<S>(config: &LoadConfig, store: Arc<S>) -> Result<LoadSummary, LoadError>
where
    S: DocumentStore + 'static,
{
    // Reject an unsupported extension before touching the store, so a bad
    // invocation never deletes an index.
    RecordFormat::from_path(&config.input_file)?;

    store.ping().await.map_err(LoadError::Unreachable)?;

    if config.delete_index_first {
        reset_index(store.as_ref(), &config.index_name).await?;
    }

    // Open before spawning anything so a missing or unreadable file aborts
    // with zero documents in flight.
    let reader = RecordReader::open(&config.input_file)?;

    let (batch_tx, batch_rx) = mpsc::channel(config.workers.get() * 2);
    let mut workers = spawn_workers(
        Arc::clone(&store),
        config.index_name.clone(),
        batch_rx,
        config.workers.get(),
        retry_policy(config.retry_attempts),
    );

    let producer = spawn_producer(
        reader,
        IdAssigner::new(config.id_field.clone(), config.id_start_from),
        config.batch_size,
        batch_tx,
    );

    let report = producer.await??;

    let mut outcomes = Vec::new();
    while let Some(joined) = workers.join_next().await {
        outcomes.extend(joined?);
    }
    outcomes.sort_unstable_by_key(|outcome| outcome.ordinal);

    let mut summary = LoadSummary {
        skipped_records: report.skipped_records,
        record_failures: report.record_failures,
        ..LoadSummary::default()
    };
    for outcome in outcomes {
        summary.attempted += outcome.attempted;
        summary.succeeded += outcome.succeeded;
        summary.failed += outcome.failures.len();
        summary.doc_failures.extend(outcome.failures);
    }

    info!(
        stage = "completed",
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped_records,
        "load finished"
    );
    Ok(summary)
}

async fn reset_index<S>(store: &S, index: &str) -> Result<(), LoadError>
where
    S: DocumentStore + ?Sized,
{
    store
        .delete_index(index)
        .await
        .map_err(LoadError::IndexReset)?;
    store
        .create_index(index)
        .await
        .map_err(LoadError::IndexReset)?;
    info!(stage = "index_reset", index, "index deleted and re-created");
    Ok(())
}

fn retry_policy(attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(RETRY_MIN_DELAY)
        .with_max_delay(RETRY_MAX_DELAY)
        .with_max_times(attempts.saturating_sub(1))
        .with_jitter()
}

struct ProducerReport {
    skipped_records: usize,
    record_failures: Vec<RecordFailure>,
}

/// Parsing and id assignment run on a blocking thread: the CSV reader is
/// synchronous, and `blocking_send` on the bounded channel provides the
/// backpressure that keeps only the in-flight batches in memory.
fn spawn_producer(
    reader: RecordReader,
    mut assigner: IdAssigner,
    batch_size: NonZeroUsize,
    batch_tx: mpsc::Sender<(usize, Vec<Document>)>,
) -> JoinHandle<Result<ProducerReport, LoadError>> {
    tokio::task::spawn_blocking(move || {
        let mut skipped_records = 0usize;
        let mut record_failures = Vec::new();
        let mut fatal: Option<RecordError> = None;

        let documents = reader
            .map_while(|item| match item {
                Ok(source) => match assigner.assign(source.record) {
                    Ok(document) => Some(Some(document)),
                    Err(err) => {
                        skipped_records += 1;
                        record_failures.push(RecordFailure {
                            line: source.line,
                            reason: err.to_string(),
                        });
                        Some(None)
                    }
                },
                Err(err) if err.is_fatal() => {
                    fatal = Some(err);
                    None
                }
                Err(err) => {
                    skipped_records += 1;
                    record_failures.push(RecordFailure {
                        line: err.line().unwrap_or_default(),
                        reason: err.to_string(),
                    });
                    Some(None)
                }
            })
            .flatten();

        for (ordinal, batch) in batched(documents, batch_size).enumerate() {
            debug!(stage = "dispatch", ordinal, size = batch.len(), "batch ready");
            if batch_tx.blocking_send((ordinal, batch)).is_err() {
                return Err(LoadError::ChannelClosed);
            }
        }

        if let Some(err) = fatal {
            return Err(err.into());
        }
        Ok(ProducerReport {
            skipped_records,
            record_failures,
        })
    })
}

struct BatchOutcome {
    ordinal: usize,
    attempted: usize,
    succeeded: usize,
    failures: Vec<DocFailure>,
}

type BatchQueue = Arc<Mutex<mpsc::Receiver<(usize, Vec<Document>)>>>;

fn spawn_workers<S>(
    store: Arc<S>,
    index: String,
    receiver: mpsc::Receiver<(usize, Vec<Document>)>,
    worker_count: usize,
    retry: ExponentialBuilder,
) -> JoinSet<Vec<BatchOutcome>>
where
    S: DocumentStore + 'static,
{
    let queue: BatchQueue = Arc::new(Mutex::new(receiver));
    let index: Arc<str> = index.into();

    let mut join_set = JoinSet::new();
    for worker_idx in 0..worker_count {
        let queue = Arc::clone(&queue);
        let store = Arc::clone(&store);
        let index = Arc::clone(&index);
        let retry = retry.clone();
        join_set
            .spawn(async move { run_worker(worker_idx, queue, store, index, retry).await });
    }
    join_set
}

async fn run_worker<S>(
    worker_idx: usize,
    queue: BatchQueue,
    store: Arc<S>,
    index: Arc<str>,
    retry: ExponentialBuilder,
) -> Vec<BatchOutcome>
where
    S: DocumentStore,
{
    let mut outcomes = Vec::new();
    loop {
        let Some((ordinal, batch)) = receive_batch(&queue).await else {
            debug!(
                stage = "worker_shutdown",
                worker = worker_idx,
                "worker terminating (channel closed)"
            );
            break;
        };
        let outcome = write_batch(store.as_ref(), &index, ordinal, batch, &retry).await;
        outcomes.push(outcome);
    }
    outcomes
}

async fn receive_batch(queue: &BatchQueue) -> Option<(usize, Vec<Document>)> {
    let mut guard = queue.lock().await;
    guard.recv().await
}

/// Write one batch, retrying transient transport faults with bounded
/// backoff. Exhausted retries downgrade to a per-document failure for every
/// document in the batch; the run continues either way.
async fn write_batch<S>(
    store: &S,
    index: &str,
    ordinal: usize,
    batch: Vec<Document>,
    retry: &ExponentialBuilder,
) -> BatchOutcome
where
    S: DocumentStore + ?Sized,
{
    let attempted = batch.len();
    let result = (|| async { store.bulk_write(index, &batch).await })
        .retry(retry.clone())
        .sleep(sleep)
        .when(StoreError::is_transient)
        .notify(|err: &StoreError, delay: Duration| {
            warn!(
                stage = "bulk_write",
                ordinal,
                delay_ms = delay.as_millis(),
                error = %err,
                "retrying bulk request"
            );
        })
        .await;

    match result {
        Ok(statuses) => {
            let failures: Vec<DocFailure> = statuses
                .into_iter()
                .filter_map(|status| {
                    status.error.map(|reason| DocFailure {
                        id: status.id,
                        reason,
                    })
                })
                .collect();
            BatchOutcome {
                ordinal,
                attempted,
                succeeded: attempted - failures.len(),
                failures,
            }
        }
        Err(err) => {
            warn!(
                stage = "bulk_write",
                ordinal,
                error = %err,
                "batch failed; recording every document as failed"
            );
            let reason = err.to_string();
            let failures = batch
                .into_iter()
                .map(|doc| DocFailure {
                    id: doc.id,
                    reason: reason.clone(),
                })
                .collect();
            BatchOutcome {
                ordinal,
                attempted,
                succeeded: 0,
                failures,
            }
        }
    }
}
