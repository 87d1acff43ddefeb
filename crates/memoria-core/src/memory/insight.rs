//! Derived "insight" records.
//!
//! After a successful primary write, long records enqueue a short-term
//! insight record summarizing them. The queue is drained by a background
//! worker; a failed derived write is logged and never reaches the caller of
//! the primary write.

use std::sync::Arc;

use chrono::Utc;
use memoria_types::config::InsightConfig;
use memoria_types::memory::{MemoryId, MemoryRecord, MemoryTier};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::MemoryStore;

/// Content type tag of derived records.
pub const INSIGHT_CONTENT_TYPE: &str = "insight";

/// Decides which records get an insight and what it contains.
#[derive(Debug, Clone)]
pub struct InsightPolicy {
    config: InsightConfig,
}

impl InsightPolicy {
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    /// Whether `record` should produce a derived insight.
    ///
    /// Insight records themselves never do.
    pub fn should_derive(&self, record: &MemoryRecord) -> bool {
        self.config.enabled
            && record.content_type != INSIGHT_CONTENT_TYPE
            && record.content.chars().count() > self.config.min_content_len
    }

    /// Build the derived record for `source`.
    pub fn derive(&self, source: &MemoryRecord) -> MemoryRecord {
        let mut excerpt: String = source
            .content
            .chars()
            .take(self.config.excerpt_len)
            .collect();
        if source.content.chars().count() > self.config.excerpt_len {
            excerpt = format!("{}...", excerpt.trim_end());
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "derivedFrom".to_string(),
            serde_json::Value::String(source.id.to_string()),
        );
        metadata.insert(
            "sourceContentType".to_string(),
            serde_json::Value::String(source.content_type.clone()),
        );

        MemoryRecord {
            id: MemoryId::new(),
            tier: MemoryTier::ShortTerm,
            content_type: INSIGHT_CONTENT_TYPE.to_string(),
            content: format!("Insight from {}: {}", source.content_type, excerpt),
            embedding: None,
            scope: source.scope.clone(),
            metadata,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Start the background worker that persists derived records.
    ///
    /// The worker exits once every `InsightQueue` clone has been dropped.
    pub fn spawn<S: MemoryStore + 'static>(
        self,
        store: Arc<S>,
        capacity: usize,
    ) -> (InsightQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<MemoryRecord>(capacity.max(1));
        let policy = Arc::new(self);
        let worker_policy = Arc::clone(&policy);

        let handle = tokio::spawn(async move {
            while let Some(source) = rx.recv().await {
                let derived = worker_policy.derive(&source);
                match store.insert(&derived).await {
                    Ok(id) => debug!(source_id = %source.id, insight_id = %id, "insight recorded"),
                    Err(e) => warn!(source_id = %source.id, error = %e, "failed to write insight"),
                }
            }
        });

        (InsightQueue { tx, policy }, handle)
    }
}

/// Producer side of the insight queue.
#[derive(Debug, Clone)]
pub struct InsightQueue {
    tx: mpsc::Sender<MemoryRecord>,
    policy: Arc<InsightPolicy>,
}

impl InsightQueue {
    /// Enqueue `record` if the policy applies. Never blocks; a full or
    /// closed queue drops the insight with a warning.
    pub fn offer(&self, record: &MemoryRecord) {
        if !self.policy.should_derive(record) {
            return;
        }
        if let Err(e) = self.tx.try_send(record.clone()) {
            warn!(source_id = %record.id, error = %e, "insight queue rejected record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::testing::{InMemoryStore, record_with};
    use std::sync::atomic::Ordering;

    fn enabled(min_content_len: usize, excerpt_len: usize) -> InsightPolicy {
        InsightPolicy::new(InsightConfig {
            enabled: true,
            min_content_len,
            excerpt_len,
        })
    }

    #[test]
    fn short_or_disabled_records_are_skipped() {
        let long = record_with(&"x".repeat(50), MemoryTier::LongTerm, "note");
        assert!(!InsightPolicy::new(InsightConfig::default()).should_derive(&long));
        assert!(!enabled(100, 10).should_derive(&long));
        assert!(enabled(10, 10).should_derive(&long));
    }

    #[test]
    fn insights_never_derive_insights() {
        let policy = enabled(10, 10);
        let source = record_with(&"y".repeat(50), MemoryTier::LongTerm, "report");
        let derived = policy.derive(&source);
        let long_insight = MemoryRecord {
            content: "z".repeat(50),
            ..derived
        };
        assert!(!policy.should_derive(&long_insight));
    }

    #[test]
    fn derived_record_links_back_to_source() {
        let policy = enabled(10, 12);
        let mut source = record_with("Revenue grew strongly in every region", MemoryTier::LongTerm, "excel_analysis");
        source.scope.owner_id = Some("alice".to_string());

        let derived = policy.derive(&source);
        assert_eq!(derived.tier, MemoryTier::ShortTerm);
        assert_eq!(derived.content_type, INSIGHT_CONTENT_TYPE);
        assert_eq!(derived.content, "Insight from excel_analysis: Revenue grew...");
        assert_eq!(derived.scope.owner_id.as_deref(), Some("alice"));
        assert_eq!(derived.metadata["derivedFrom"], source.id.to_string());
        assert!(derived.embedding.is_none());
    }

    #[tokio::test]
    async fn worker_persists_derived_records() {
        let store = Arc::new(InMemoryStore::default());
        let (queue, handle) = enabled(10, 20).spawn(Arc::clone(&store), 8);

        let source = record_with(&"quarterly numbers ".repeat(5), MemoryTier::LongTerm, "report");
        queue.offer(&source);
        drop(queue);
        handle.await.unwrap();

        let stored = store.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content_type, INSIGHT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn worker_survives_store_failures() {
        let store = Arc::new(InMemoryStore::default());
        store.fail_inserts.store(true, Ordering::SeqCst);
        let (queue, handle) = enabled(10, 20).spawn(Arc::clone(&store), 8);

        queue.offer(&record_with(&"a".repeat(40), MemoryTier::LongTerm, "report"));
        queue.offer(&record_with(&"b".repeat(40), MemoryTier::LongTerm, "report"));
        drop(queue);
        handle.await.unwrap();

        assert!(store.snapshot().is_empty());
    }
}
