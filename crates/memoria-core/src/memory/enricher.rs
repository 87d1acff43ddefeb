//! Knowledge-graph enrichment of search results.
//!
//! The engine hands the final, ranked records to a `KnowledgeEnricher` and
//! receives related-record annotations back. Enrichment can only attach
//! annotations; it never sees the result list mutably, so it cannot drop or
//! reorder results.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use memoria_types::error::MemoryError;
use memoria_types::memory::{MemoryId, MemoryRecord, MemoryScope};
use serde_json::Value;

use super::store::{MemoryStore, RecordFilter, RecordOrder, RecordQuery};

/// Maximum related ids attached to a single result.
pub const MAX_RELATED: usize = 10;

/// Related-record annotations keyed by result id.
pub type RelatedMap = HashMap<MemoryId, Vec<MemoryId>>;

/// Collaborator that finds records related to a result set.
pub trait KnowledgeEnricher: Send + Sync {
    fn related(
        &self,
        records: &[MemoryRecord],
    ) -> impl std::future::Future<Output = Result<RelatedMap, MemoryError>> + Send;
}

/// Enricher used when no knowledge graph is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl KnowledgeEnricher for NoEnrichment {
    async fn related(&self, _records: &[MemoryRecord]) -> Result<RelatedMap, MemoryError> {
        Ok(RelatedMap::new())
    }
}

/// Relates records in the same owner scope that share a metadata value.
///
/// Two records are related when, for some key present in both, the values
/// are equal or are arrays with a common element. Records without an owner
/// are not enriched, and expired records are never offered as related.
pub struct MetadataOverlapEnricher<S: MemoryStore> {
    store: Arc<S>,
    scan_limit: u32,
}

impl<S: MemoryStore> MetadataOverlapEnricher<S> {
    /// `scan_limit` bounds how many of the owner's newest records are compared.
    pub fn new(store: Arc<S>, scan_limit: u32) -> Self {
        Self { store, scan_limit }
    }
}

/// Whether two metadata maps share a value under a common key.
pub fn metadata_overlaps(
    a: &serde_json::Map<String, Value>,
    b: &serde_json::Map<String, Value>,
) -> bool {
    a.iter().any(|(key, left)| match b.get(key) {
        Some(right) if left == right => true,
        Some(Value::Array(right)) => match left {
            Value::Array(left) => left.iter().any(|v| right.contains(v)),
            _ => false,
        },
        _ => false,
    })
}

impl<S: MemoryStore> KnowledgeEnricher for MetadataOverlapEnricher<S> {
    async fn related(&self, records: &[MemoryRecord]) -> Result<RelatedMap, MemoryError> {
        let mut by_owner: BTreeMap<&str, Vec<&MemoryRecord>> = BTreeMap::new();
        for record in records {
            if let Some(owner) = record.scope.owner_id.as_deref()
                && !record.metadata.is_empty()
            {
                by_owner.entry(owner).or_default().push(record);
            }
        }

        let now = Utc::now();
        let mut related = RelatedMap::new();
        for (owner, group) in by_owner {
            let query = RecordQuery::new(
                RecordFilter {
                    scope: MemoryScope {
                        owner_id: Some(owner.to_string()),
                        ..Default::default()
                    },
                    live_at: Some(now),
                    ..Default::default()
                },
                RecordOrder::CreatedDesc,
                self.scan_limit,
            );
            let candidates = self
                .store
                .query(&query)
                .await
                .map_err(|e| MemoryError::EnrichmentFailed(e.to_string()))?;

            for record in group {
                let ids: Vec<MemoryId> = candidates
                    .iter()
                    .filter(|c| c.id != record.id && metadata_overlaps(&record.metadata, &c.metadata))
                    .map(|c| c.id)
                    .take(MAX_RELATED)
                    .collect();
                if !ids.is_empty() {
                    related.insert(record.id, ids);
                }
            }
        }
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::testing::{InMemoryStore, record_with};
    use memoria_types::memory::MemoryTier;
    use serde_json::json;

    fn meta(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn overlap_on_equal_scalar() {
        assert!(metadata_overlaps(
            &meta(json!({"project": "apollo", "year": 2024})),
            &meta(json!({"project": "apollo"}))
        ));
    }

    #[test]
    fn overlap_on_shared_array_element() {
        assert!(metadata_overlaps(
            &meta(json!({"people": ["ann", "bo"]})),
            &meta(json!({"people": ["cy", "bo"]}))
        ));
    }

    #[test]
    fn no_overlap_across_different_keys() {
        assert!(!metadata_overlaps(
            &meta(json!({"project": "apollo"})),
            &meta(json!({"codename": "apollo"}))
        ));
        assert!(!metadata_overlaps(&meta(json!({})), &meta(json!({"a": 1}))));
    }

    #[tokio::test]
    async fn relates_records_within_owner_scope() {
        let store = Arc::new(InMemoryStore::default());
        let mut hit = record_with("Q4 plan", MemoryTier::LongTerm, "note");
        hit.scope.owner_id = Some("alice".to_string());
        hit.metadata = meta(json!({"project": "apollo"}));

        let mut sibling = record_with("Q3 plan", MemoryTier::LongTerm, "note");
        sibling.scope.owner_id = Some("alice".to_string());
        sibling.metadata = meta(json!({"project": "apollo"}));

        let mut stranger = record_with("other", MemoryTier::LongTerm, "note");
        stranger.scope.owner_id = Some("bob".to_string());
        stranger.metadata = meta(json!({"project": "apollo"}));

        for r in [&hit, &sibling, &stranger] {
            store.insert(r).await.unwrap();
        }

        let enricher = MetadataOverlapEnricher::new(store, 100);
        let related = enricher.related(std::slice::from_ref(&hit)).await.unwrap();
        assert_eq!(related.get(&hit.id), Some(&vec![sibling.id]));
    }

    #[tokio::test]
    async fn ownerless_records_are_not_enriched() {
        let store = Arc::new(InMemoryStore::default());
        let mut hit = record_with("Q4 plan", MemoryTier::LongTerm, "note");
        hit.metadata = meta(json!({"project": "apollo"}));
        store.insert(&hit).await.unwrap();

        let enricher = MetadataOverlapEnricher::new(store, 100);
        let related = enricher.related(std::slice::from_ref(&hit)).await.unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn expired_records_are_not_related() {
        let store = Arc::new(InMemoryStore::default());
        let mut hit = record_with("Q4 plan", MemoryTier::LongTerm, "note");
        hit.scope.owner_id = Some("alice".to_string());
        hit.metadata = meta(json!({"project": "apollo"}));

        let mut live = record_with("Q3 plan", MemoryTier::LongTerm, "note");
        live.scope.owner_id = Some("alice".to_string());
        live.metadata = meta(json!({"project": "apollo"}));

        let mut expired = record_with("Q2 plan", MemoryTier::Working, "note");
        expired.scope.owner_id = Some("alice".to_string());
        expired.metadata = meta(json!({"project": "apollo"}));
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));

        for r in [&hit, &live, &expired] {
            store.insert(r).await.unwrap();
        }

        let enricher = MetadataOverlapEnricher::new(store, 100);
        let related = enricher.related(std::slice::from_ref(&hit)).await.unwrap();
        assert_eq!(related.get(&hit.id), Some(&vec![live.id]));
    }
}
