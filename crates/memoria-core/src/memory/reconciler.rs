//! Embedding backfill reconciler.
//!
//! Scans records that are still missing an embedding in ascending id order,
//! embeds them in bounded-concurrency chunks, and writes the vectors back.
//! Per-record failures are counted and skipped; the cursor moves past them
//! so repeated batches always converge to an empty scan.
//!
//! State machine: `Idle -> Scanning -> Processing -> Scanning -> ... -> Done`.
//! Only one run may be active at a time.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use memoria_types::config::BackfillConfig;
use memoria_types::error::MemoryError;
use memoria_types::memory::{MemoryId, MemoryRecord};
use memoria_types::reconcile::{ReconcileReport, ReconcileRequest, ReconcilerState};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::embedder::{Embedder, embed_one};
use super::store::{MemoryStore, RecordFilter, RecordOrder, RecordQuery};

/// Outcome of embedding a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Updated,
    /// The record gained an embedding from elsewhere in the meantime.
    AlreadyEmbedded,
    Failed,
}

/// Fills missing embeddings in batches.
pub struct EmbeddingReconciler<S: MemoryStore, E: Embedder> {
    store: Arc<S>,
    embedder: Arc<E>,
    config: BackfillConfig,
    running: Mutex<()>,
    state: watch::Sender<ReconcilerState>,
}

impl<S: MemoryStore, E: Embedder> EmbeddingReconciler<S, E> {
    pub fn new(store: Arc<S>, embedder: Arc<E>, config: BackfillConfig) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Idle);
        Self {
            store,
            embedder,
            config,
            running: Mutex::new(()),
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    /// Process a single batch.
    ///
    /// Fails with `ReconcileInProgress` if another run is active. Callers
    /// loop, passing `last_id` back as `start_id`, until `processed == 0`.
    pub async fn run_batch(&self, request: ReconcileRequest) -> Result<ReconcileReport, MemoryError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| MemoryError::ReconcileInProgress)?;

        let report = self.batch(&request).await;
        self.finish(&report);
        report
    }

    /// Process batches until a scan comes back empty.
    ///
    /// Returns the aggregate of all batches.
    pub async fn run_to_completion(
        &self,
        start_id: Option<MemoryId>,
    ) -> Result<ReconcileReport, MemoryError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| MemoryError::ReconcileInProgress)?;

        let mut total = ReconcileReport::default();
        let mut cursor = start_id;
        loop {
            let request = ReconcileRequest {
                batch_size: None,
                start_id: cursor,
            };
            let batch = match self.batch(&request).await {
                Ok(batch) => batch,
                Err(e) => {
                    self.state.send_replace(ReconcilerState::Idle);
                    return Err(e);
                }
            };
            total.absorb(&batch);
            if batch.processed == 0 {
                break;
            }
            cursor = batch.last_id;
        }

        self.state.send_replace(ReconcilerState::Done);
        info!(
            processed = total.processed,
            updated = total.updated,
            failed = total.failed,
            "embedding backfill complete"
        );
        Ok(total)
    }

    fn finish(&self, report: &Result<ReconcileReport, MemoryError>) {
        let next = match report {
            Ok(r) if r.processed == 0 => ReconcilerState::Done,
            _ => ReconcilerState::Idle,
        };
        self.state.send_replace(next);
    }

    async fn batch(&self, request: &ReconcileRequest) -> Result<ReconcileReport, MemoryError> {
        self.state.send_replace(ReconcilerState::Scanning);

        let batch_size = request.batch_size.unwrap_or(self.config.batch_size).max(1);
        let mut query = RecordQuery::new(RecordFilter::default(), RecordOrder::IdAsc, batch_size);
        query.has_embedding = Some(false);
        query.after_id = request.start_id;

        let records = self.store.query(&query).await?;
        if records.is_empty() {
            debug!(start_id = ?request.start_id, "no records missing embeddings");
            return Ok(ReconcileReport::default());
        }

        self.state.send_replace(ReconcilerState::Processing);

        let mut report = ReconcileReport {
            processed: records.len() as u32,
            last_id: records.last().map(|r| r.id),
            ..Default::default()
        };

        let chunk_size = self.config.concurrency.max(1);
        let delay = Duration::from_millis(self.config.chunk_delay_ms);
        let chunks: Vec<&[MemoryRecord]> = records.chunks(chunk_size).collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let outcomes = join_all(chunk.iter().map(|record| self.fill(record))).await;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Updated => report.updated += 1,
                    ItemOutcome::Failed => report.failed += 1,
                    ItemOutcome::AlreadyEmbedded => {}
                }
            }
            if index + 1 < chunk_count && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            processed = report.processed,
            updated = report.updated,
            failed = report.failed,
            last_id = ?report.last_id,
            "embedding backfill batch finished"
        );
        Ok(report)
    }

    async fn fill(&self, record: &MemoryRecord) -> ItemOutcome {
        let vector = match embed_one(self.embedder.as_ref(), &record.embedding_text()).await {
            Ok(v) => v,
            Err(e) => {
                warn!(id = %record.id, error = %e, "backfill embedding failed");
                return ItemOutcome::Failed;
            }
        };

        match self.store.update_embedding(&record.id, &vector).await {
            Ok(true) => ItemOutcome::Updated,
            Ok(false) => ItemOutcome::AlreadyEmbedded,
            Err(e) => {
                warn!(id = %record.id, error = %e, "backfill update failed");
                ItemOutcome::Failed
            }
        }
    }
}
