//! Memory service facade.
//!
//! Bundles the retrieval engine, writer, and backfill reconciler over a
//! single shared store and embedder so the API layer has one entry point.

use std::sync::Arc;

use chrono::Utc;
use memoria_types::config::MemoriaConfig;
use memoria_types::error::MemoryError;
use memoria_types::memory::{ListQuery, MemoryId, MemoryRecord, MemoryTier, WriteRequest, WriteResponse};
use memoria_types::reconcile::{ReconcileReport, ReconcileRequest, ReconcilerState};
use memoria_types::search::{ContextRequest, SearchQuery, SearchResponse};
use tokio_util::sync::CancellationToken;

use super::embedder::Embedder;
use super::engine::HybridRetrievalEngine;
use super::enricher::KnowledgeEnricher;
use super::insight::InsightQueue;
use super::reconciler::EmbeddingReconciler;
use super::scorer::TextScorer;
use super::store::{MemoryStore, RecordFilter, RecordOrder, RecordQuery};
use super::writer::MemoryWriter;

/// Default page size for listings.
pub const DEFAULT_LIST_LIMIT: u32 = 20;

pub struct MemoryService<S, E, T, K>
where
    S: MemoryStore,
    E: Embedder,
    T: TextScorer,
    K: KnowledgeEnricher,
{
    store: Arc<S>,
    engine: HybridRetrievalEngine<S, E, T, K>,
    writer: MemoryWriter<S, E>,
    reconciler: EmbeddingReconciler<S, E>,
    list_ceiling: u32,
}

impl<S, E, T, K> MemoryService<S, E, T, K>
where
    S: MemoryStore,
    E: Embedder,
    T: TextScorer,
    K: KnowledgeEnricher,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, scorer: T, enricher: K, config: &MemoriaConfig) -> Self {
        Self {
            engine: HybridRetrievalEngine::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                scorer,
                enricher,
                config.search.clone(),
            ),
            writer: MemoryWriter::new(Arc::clone(&store), Arc::clone(&embedder)),
            reconciler: EmbeddingReconciler::new(Arc::clone(&store), embedder, config.backfill.clone()),
            list_ceiling: config.search.max_results_ceiling.max(1),
            store,
        }
    }

    /// Enable derived insight records on write.
    pub fn with_insights(mut self, queue: InsightQueue) -> Self {
        self.writer = self.writer.with_insights(queue);
        self
    }

    pub async fn remember(&self, request: WriteRequest) -> Result<WriteResponse, MemoryError> {
        let id = self.writer.store(request).await?;
        Ok(WriteResponse { id })
    }

    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, MemoryError> {
        self.engine.search(query).await
    }

    pub async fn search_with_cancel(
        &self,
        query: SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, MemoryError> {
        self.engine.search_with_cancel(query, cancel).await
    }

    /// Memories relevant to an ongoing conversation, using the recent
    /// message window and the conversation kind's retrieval profile.
    pub async fn context(&self, request: ContextRequest) -> Result<SearchResponse, MemoryError> {
        let query = SearchQuery::for_conversation(&request).ok_or_else(|| {
            MemoryError::Validation("messages must include at least one non-empty message".to_string())
        })?;
        self.engine.search(query).await
    }

    /// Newest-first listing of live records matching the filters.
    pub async fn list(&self, query: ListQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
        let tiers = match query.memory_type.as_deref() {
            Some(t) => vec![t.parse::<MemoryTier>().map_err(MemoryError::Validation)?],
            None => Vec::new(),
        };
        let filter = RecordFilter {
            tiers,
            content_types: query.content_type.into_iter().collect(),
            scope: query.scope,
            timeframe: None,
            live_at: Some(Utc::now()),
        };
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, self.list_ceiling);

        Ok(self
            .store
            .query(&RecordQuery::new(filter, RecordOrder::CreatedDesc, limit))
            .await?)
    }

    pub async fn backfill(&self, request: ReconcileRequest) -> Result<ReconcileReport, MemoryError> {
        self.reconciler.run_batch(request).await
    }

    pub async fn backfill_all(&self, start_id: Option<MemoryId>) -> Result<ReconcileReport, MemoryError> {
        self.reconciler.run_to_completion(start_id).await
    }

    pub fn backfill_state(&self) -> ReconcilerState {
        self.reconciler.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::enricher::NoEnrichment;
    use crate::memory::scorer::LexicalScorer;
    use crate::memory::testing::{InMemoryStore, ScriptedEmbedder, record_at};
    use chrono::TimeZone;
    use memoria_types::memory::MemoryScope;
    use memoria_types::search::{ConversationKind, SearchPath};

    type TestService = MemoryService<InMemoryStore, ScriptedEmbedder, LexicalScorer, NoEnrichment>;

    fn service(store: Arc<InMemoryStore>, embedder: ScriptedEmbedder) -> TestService {
        MemoryService::new(
            store,
            Arc::new(embedder),
            LexicalScorer::default(),
            NoEnrichment,
            &MemoriaConfig::default(),
        )
    }

    fn write(content: &str, generate_embedding: bool) -> WriteRequest {
        WriteRequest {
            content: content.to_string(),
            content_type: "note".to_string(),
            memory_type: "long-term".to_string(),
            scope: MemoryScope::default(),
            metadata: None,
            expires_at: None,
            generate_embedding: Some(generate_embedding),
        }
    }

    #[tokio::test]
    async fn written_records_are_searchable() {
        let store = Arc::new(InMemoryStore::default());
        let svc = service(store, ScriptedEmbedder::new(vec![1.0, 0.0]));

        let written = svc.remember(write("quarterly revenue grew", true)).await.unwrap();
        let resp = svc.search(SearchQuery::new("quarterly revenue")).await.unwrap();

        assert_eq!(resp.search_path, SearchPath::Hybrid);
        assert_eq!(resp.results[0].id, written.id);
        assert!((resp.results[0].relevance - (0.7 + 0.3 * 2.0 / 3.0)).abs() < 1e-5);
    }

    #[tokio::test]
    async fn backfill_makes_unembedded_records_vector_searchable() {
        let store = Arc::new(InMemoryStore::default());
        let svc = service(Arc::clone(&store), ScriptedEmbedder::new(vec![1.0, 0.0]));
        svc.remember(write("fiscal outlook", false)).await.unwrap();

        let before = svc.search(SearchQuery::new("budget")).await.unwrap();
        assert!(before.results.is_empty());

        let report = svc.backfill_all(None).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(svc.backfill_state(), ReconcilerState::Done);

        let after = svc.search(SearchQuery::new("budget")).await.unwrap();
        assert_eq!(after.results.len(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let store = Arc::new(InMemoryStore::with_records(vec![
            record_at("jan", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            record_at("mar", Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            record_at("feb", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
        ]));
        let svc = service(store, ScriptedEmbedder::new(vec![1.0]));

        let listed = svc
            .list(ListQuery {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        let contents: Vec<&str> = listed.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["mar", "feb"]);
    }

    #[tokio::test]
    async fn list_rejects_unknown_tier() {
        let svc = service(Arc::new(InMemoryStore::default()), ScriptedEmbedder::new(vec![1.0]));
        let err = svc
            .list(ListQuery {
                memory_type: Some("forever".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn context_search_uses_conversation_profile() {
        let mut wedding = record_at("the wedding at the lake", Utc::now());
        wedding.content_type = "event".to_string();
        let mut note = record_at("lake cleanup budget", Utc::now());
        note.content_type = "note".to_string();
        let store = Arc::new(InMemoryStore::with_records(vec![wedding.clone(), note]));
        let svc = service(store, ScriptedEmbedder::failing());

        let resp = svc
            .context(ContextRequest {
                messages: vec!["wedding".to_string(), "lake wedding".to_string()],
                conversation_type: ConversationKind::Reminiscence,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(resp.search_params.max_results, Some(7));
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].id, wedding.id);
    }

    #[tokio::test]
    async fn context_search_rejects_blank_messages() {
        let svc = service(Arc::new(InMemoryStore::default()), ScriptedEmbedder::new(vec![1.0]));
        let err = svc
            .context(ContextRequest {
                messages: vec![String::new()],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }
}
