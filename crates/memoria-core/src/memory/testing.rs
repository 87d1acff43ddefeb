//! In-memory fakes for the memory ports, shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use memoria_types::error::{EmbeddingError, MemoryError, RepositoryError};
use memoria_types::memory::{MemoryId, MemoryRecord, MemoryScope, MemoryTier};

use super::embedder::{Embedder, cosine_similarity};
use super::enricher::{KnowledgeEnricher, RelatedMap};
use super::scorer::{TextScorer, tokenize};
use super::store::{MemoryStore, RecordOrder, RecordQuery};

pub fn record_with(content: &str, tier: MemoryTier, content_type: &str) -> MemoryRecord {
    MemoryRecord {
        id: MemoryId::new(),
        tier,
        content_type: content_type.to_string(),
        content: content.to_string(),
        embedding: None,
        scope: MemoryScope::default(),
        metadata: serde_json::Map::new(),
        created_at: Utc::now(),
        expires_at: None,
    }
}

pub fn record_at(content: &str, created_at: DateTime<Utc>) -> MemoryRecord {
    let mut r = record_with(content, MemoryTier::LongTerm, "note");
    r.created_at = created_at;
    r
}

/// Unit vector at the given cosine to `[1, 0]`.
pub fn vector_at(cosine: f32) -> Vec<f32> {
    vec![cosine, (1.0 - cosine * cosine).max(0.0).sqrt()]
}

/// Vec-backed store with switchable failures.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<MemoryRecord>>,
    pub fail_vector_queries: AtomicBool,
    pub fail_text_queries: AtomicBool,
    pub fail_all_queries: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_updates_for: Mutex<HashSet<MemoryId>>,
    pub query_count: AtomicUsize,
}

impl InMemoryStore {
    pub fn with_records(records: Vec<MemoryRecord>) -> Self {
        let store = Self::default();
        *store.records.lock().unwrap() = records;
        store
    }

    pub fn snapshot(&self) -> Vec<MemoryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn get(&self, id: &MemoryId) -> Option<MemoryRecord> {
        self.records.lock().unwrap().iter().find(|r| r.id == *id).cloned()
    }
}

impl MemoryStore for InMemoryStore {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_queries.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        match query.order {
            RecordOrder::NearestTo(_) if self.fail_vector_queries.load(Ordering::SeqCst) => {
                return Err(RepositoryError::Query("vector index offline".to_string()));
            }
            RecordOrder::TextRelevance(_) if self.fail_text_queries.load(Ordering::SeqCst) => {
                return Err(RepositoryError::Query("fts index offline".to_string()));
            }
            _ => {}
        }

        let mut rows: Vec<MemoryRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| query.filter.matches(r))
            .filter(|r| query.has_embedding.is_none_or(|want| r.has_embedding() == want))
            .filter(|r| query.after_id.is_none_or(|after| r.id > after))
            .cloned()
            .collect();

        match &query.order {
            RecordOrder::IdAsc => rows.sort_by_key(|r| r.id),
            RecordOrder::CreatedDesc => {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)))
            }
            RecordOrder::NearestTo(target) => {
                rows.retain(|r| r.has_embedding());
                if let Some(scan) = query.scan_limit {
                    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
                    rows.truncate(scan as usize);
                }
                let sim = |r: &MemoryRecord| {
                    cosine_similarity(target, r.embedding.as_deref().unwrap_or_default())
                };
                rows.sort_by(|a, b| sim(b).total_cmp(&sim(a)).then(a.id.cmp(&b.id)));
            }
            RecordOrder::TextRelevance(text) => {
                let terms: HashSet<String> = tokenize(text).collect();
                rows.retain(|r| tokenize(&r.content).any(|t| terms.contains(&t)));
                // Shortest content first, unrelated to lexical score, so the
                // engine's own ranking is what tests observe.
                rows.sort_by(|a, b| a.content.len().cmp(&b.content.len()).then(a.id.cmp(&b.id)));
            }
        }
        rows.truncate(query.limit as usize);
        Ok(rows)
    }

    async fn insert(&self, record: &MemoryRecord) -> Result<MemoryId, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(record.id)
    }

    async fn update_embedding(
        &self,
        id: &MemoryId,
        embedding: &[f32],
    ) -> Result<bool, RepositoryError> {
        if self.fail_updates_for.lock().unwrap().contains(id) {
            return Err(RepositoryError::Query("locked".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == *id) {
            Some(r) if r.embedding.is_none() => {
                r.embedding = Some(embedding.to_vec());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Embedder returning scripted vectors per input text.
pub struct ScriptedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    fail_texts: HashSet<String>,
    pub failing: AtomicBool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    /// Highest number of `embed` calls observed running at once.
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            fail_texts: HashSet::new(),
            failing: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let e = Self::new(vec![1.0, 0.0]);
        e.failing.store(true, Ordering::SeqCst);
        e
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_texts.insert(text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Embedder for ScriptedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let result = self.respond(texts).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }
}

impl ScriptedEmbedder {
    async fn respond(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("scripted outage".to_string()));
        }
        texts
            .iter()
            .map(|t| {
                if self.fail_texts.contains(t) {
                    Err(EmbeddingError::RateLimited)
                } else {
                    Ok(self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
                }
            })
            .collect()
    }
}

/// Scorer returning fixed scores keyed by record content.
#[derive(Default)]
pub struct FixedScorer {
    scores: HashMap<String, f32>,
}

impl FixedScorer {
    pub fn with(mut self, content: &str, score: f32) -> Self {
        self.scores.insert(content.to_string(), score);
        self
    }
}

impl TextScorer for FixedScorer {
    fn score(&self, _query: &str, record: &MemoryRecord) -> f32 {
        self.scores.get(&record.content).copied().unwrap_or(0.0)
    }
}

/// Enricher that always fails.
pub struct FailingEnricher;

impl KnowledgeEnricher for FailingEnricher {
    async fn related(&self, _records: &[MemoryRecord]) -> Result<RelatedMap, MemoryError> {
        Err(MemoryError::EnrichmentFailed("graph offline".to_string()))
    }
}

/// Enricher that relates every record to itself.
pub struct EchoEnricher;

impl KnowledgeEnricher for EchoEnricher {
    async fn related(&self, records: &[MemoryRecord]) -> Result<RelatedMap, MemoryError> {
        Ok(records.iter().map(|r| (r.id, vec![r.id])).collect())
    }
}
