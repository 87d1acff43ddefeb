//! MemoryStore trait definition.
//!
//! Abstracts persisted memory records: filtered queries, inserts, and the
//! one-time embedding update. Follows the RPITIT repository pattern used
//! throughout memoria-core; implementations live in memoria-infra.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use memoria_types::error::RepositoryError;
use memoria_types::memory::{MemoryId, MemoryRecord, MemoryScope, MemoryTier};
use memoria_types::search::Timeframe;

/// Predicates shared by every record query.
///
/// Empty `tiers` / `content_types` mean "any". Scope fields that are `None`
/// are unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub tiers: Vec<MemoryTier>,
    pub content_types: Vec<String>,
    pub scope: MemoryScope,
    pub timeframe: Option<Timeframe>,
    /// Exclude records whose `expires_at` is at or before this instant.
    pub live_at: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Whether a record satisfies every predicate.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if !self.tiers.is_empty() && !self.tiers.contains(&record.tier) {
            return false;
        }
        if !self.content_types.is_empty() && !self.content_types.contains(&record.content_type) {
            return false;
        }
        let scope_ok = |want: &Option<String>, have: &Option<String>| match want {
            Some(w) => have.as_deref() == Some(w.as_str()),
            None => true,
        };
        if !scope_ok(&self.scope.owner_id, &record.scope.owner_id)
            || !scope_ok(&self.scope.session_id, &record.scope.session_id)
            || !scope_ok(&self.scope.conversation_id, &record.scope.conversation_id)
            || !scope_ok(&self.scope.topic_id, &record.scope.topic_id)
        {
            return false;
        }
        if let Some(tf) = &self.timeframe
            && !tf.contains(&record.created_at)
        {
            return false;
        }
        if let (Some(now), Some(expires)) = (self.live_at, record.expires_at)
            && expires <= now
        {
            return false;
        }
        true
    }
}

/// Result ordering for a record query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RecordOrder {
    /// Ascending by id (creation order). The backfill cursor order.
    #[default]
    IdAsc,
    /// Newest first.
    CreatedDesc,
    /// Nearest to the given vector first (cosine). Records without an
    /// embedding are excluded.
    NearestTo(Vec<f32>),
    /// Records sharing at least one term with the text. Stores may order
    /// by their own relevance estimate; callers re-rank with a `TextScorer`,
    /// so `limit` should cover every match the caller wants considered.
    TextRelevance(String),
}

/// A filtered, ordered, limited record query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub filter: RecordFilter,
    /// `Some(true)`: only embedded records; `Some(false)`: only records
    /// still missing an embedding.
    pub has_embedding: Option<bool>,
    /// Exclusive lower bound on id (ascending cursor).
    pub after_id: Option<MemoryId>,
    pub order: RecordOrder,
    pub limit: u32,
    /// Bound on rows compared for `NearestTo`. When set, only the newest
    /// `scan_limit` matching rows are ranked.
    pub scan_limit: Option<u32>,
}

impl RecordQuery {
    pub fn new(filter: RecordFilter, order: RecordOrder, limit: u32) -> Self {
        Self {
            filter,
            has_embedding: None,
            after_id: None,
            order,
            limit,
            scan_limit: None,
        }
    }
}

/// Repository trait for memory record persistence.
///
/// Implementations live in memoria-infra (e.g., `SqliteMemoryStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MemoryStore: Send + Sync {
    /// Run a filtered query.
    fn query(
        &self,
        query: &RecordQuery,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send;

    /// Persist a new record (including its embedding, if present).
    fn insert(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<MemoryId, RepositoryError>> + Send;

    /// Set the embedding of a record that has none.
    ///
    /// Returns `false` when the record does not exist or already has an
    /// embedding. An existing embedding is never overwritten.
    fn update_embedding(
        &self,
        id: &MemoryId,
        embedding: &[f32],
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}

impl<T: MemoryStore> MemoryStore for Arc<T> {
    fn query(
        &self,
        query: &RecordQuery,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send {
        (**self).query(query)
    }

    fn insert(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<MemoryId, RepositoryError>> + Send {
        (**self).insert(record)
    }

    fn update_embedding(
        &self,
        id: &MemoryId,
        embedding: &[f32],
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send {
        (**self).update_embedding(id, embedding)
    }
}
