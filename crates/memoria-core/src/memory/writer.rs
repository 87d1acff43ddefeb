//! Memory writer.
//!
//! Validates write requests, computes the embedding when asked to (best
//! effort), persists the record, and hands it to the insight policy.

use std::sync::Arc;

use chrono::Utc;
use memoria_types::error::MemoryError;
use memoria_types::memory::{MemoryId, MemoryRecord, MemoryTier, WriteRequest};
use tracing::{info, warn};

use super::embedder::{Embedder, embed_one};
use super::insight::InsightQueue;
use super::store::MemoryStore;

/// Validates and persists new memory records.
pub struct MemoryWriter<S: MemoryStore, E: Embedder> {
    store: Arc<S>,
    embedder: Arc<E>,
    insights: Option<InsightQueue>,
}

impl<S: MemoryStore, E: Embedder> MemoryWriter<S, E> {
    pub fn new(store: Arc<S>, embedder: Arc<E>) -> Self {
        Self {
            store,
            embedder,
            insights: None,
        }
    }

    /// Route successful writes through the insight queue.
    pub fn with_insights(mut self, queue: InsightQueue) -> Self {
        self.insights = Some(queue);
        self
    }

    /// Build a record from a request without touching storage.
    pub fn prepare(request: WriteRequest) -> Result<MemoryRecord, MemoryError> {
        let tier: MemoryTier = request.memory_type.parse().map_err(MemoryError::Validation)?;
        if request.content.trim().is_empty() {
            return Err(MemoryError::Validation("content must not be empty".to_string()));
        }
        if request.content_type.trim().is_empty() {
            return Err(MemoryError::Validation("contentType must not be empty".to_string()));
        }

        Ok(MemoryRecord {
            id: MemoryId::new(),
            tier,
            content_type: request.content_type,
            content: request.content,
            embedding: None,
            scope: request.scope,
            metadata: request.metadata.unwrap_or_default(),
            created_at: Utc::now(),
            expires_at: request.expires_at,
        })
    }

    /// Store a new record and return its id.
    ///
    /// Embedding failures leave the record without an embedding for the
    /// backfill reconciler to fill later. Persistence failures surface as
    /// `WriteFailed`.
    pub async fn store(&self, request: WriteRequest) -> Result<MemoryId, MemoryError> {
        let generate_embedding = request.generate_embedding.unwrap_or(true);
        let mut record = Self::prepare(request)?;

        if generate_embedding {
            match embed_one(self.embedder.as_ref(), &record.embedding_text()).await {
                Ok(vector) => record.embedding = Some(vector),
                Err(e) => {
                    warn!(id = %record.id, error = %e, "embedding failed, storing record without one");
                }
            }
        }

        let id = self
            .store
            .insert(&record)
            .await
            .map_err(|e| MemoryError::WriteFailed(e.to_string()))?;

        info!(
            id = %id,
            tier = %record.tier,
            content_type = %record.content_type,
            embedded = record.has_embedding(),
            "memory stored"
        );

        if let Some(queue) = &self.insights {
            queue.offer(&record);
        }
        Ok(id)
    }
}
