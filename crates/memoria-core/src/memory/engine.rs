//! Hybrid retrieval engine.
//!
//! Answers a `SearchQuery` by running a vector-similarity sub-query and a
//! lexical sub-query concurrently, merging them by record id, and ranking on
//! a weighted combination of both channel scores. Any failure on the hybrid
//! path falls back to the text-only path; only when that fails as well does
//! the search error.
//!
//! Merging, ranking, and faceting are pure functions of their inputs so the
//! same store contents always produce the same ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use memoria_types::config::SearchConfig;
use memoria_types::error::MemoryError;
use memoria_types::memory::{MemoryRecord, MemoryTier};
use memoria_types::search::{
    ResultSource, SearchFacets, SearchPath, SearchQuery, SearchResponse, SearchResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, field, info_span, warn};

use super::embedder::{Embedder, cosine_similarity, embed_one};
use super::enricher::KnowledgeEnricher;
use super::scorer::TextScorer;
use super::store::{MemoryStore, RecordFilter, RecordOrder, RecordQuery};

/// Channel weights applied when combining scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub vector: f32,
    pub text: f32,
}

impl Weights {
    /// Weights for the text-only path: raw text score, no vector channel.
    pub const TEXT_ONLY: Weights = Weights {
        vector: 0.0,
        text: 1.0,
    };
}

/// Fully resolved search parameters.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub text: String,
    pub filter: RecordFilter,
    pub max_results: usize,
    /// Rows requested from each sub-query.
    pub candidate_limit: u32,
    pub threshold: f32,
    pub weights: Weights,
    pub use_vector: bool,
    pub hybrid: bool,
    pub include_metadata: bool,
    pub include_knowledge_graph: bool,
}

impl SearchPlan {
    /// Validate a request and apply defaults. Performs no I/O.
    pub fn resolve(
        query: &SearchQuery,
        config: &SearchConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, MemoryError> {
        let text = query.query.trim();
        if text.is_empty() {
            return Err(MemoryError::Validation("query must not be empty".to_string()));
        }

        let tiers = query
            .memory_types
            .iter()
            .flatten()
            .map(|t| t.parse::<MemoryTier>().map_err(MemoryError::Validation))
            .collect::<Result<Vec<_>, _>>()?;

        let weights = Weights {
            vector: query.vector_weight.unwrap_or(config.vector_weight),
            text: query.text_weight.unwrap_or(config.text_weight),
        };
        if !weights.vector.is_finite() || weights.vector < 0.0 {
            return Err(MemoryError::Validation(format!(
                "vectorWeight must be a non-negative number, got {}",
                weights.vector
            )));
        }
        if !weights.text.is_finite() || weights.text < 0.0 {
            return Err(MemoryError::Validation(format!(
                "textWeight must be a non-negative number, got {}",
                weights.text
            )));
        }

        let threshold = query.effective_threshold(config.default_threshold);
        if !threshold.is_finite() {
            return Err(MemoryError::Validation("relevance threshold must be finite".to_string()));
        }

        if let Some(tf) = &query.timeframe
            && let (Some(start), Some(end)) = (tf.start, tf.end)
            && start > end
        {
            return Err(MemoryError::Validation(
                "timeframe start must not be after end".to_string(),
            ));
        }

        let ceiling = config.max_results_ceiling.max(1);
        let max_results = query
            .max_results
            .unwrap_or(config.default_max_results)
            .clamp(1, ceiling);
        let candidate_limit = max_results.max(config.candidate_floor.min(ceiling));

        Ok(Self {
            text: text.to_string(),
            filter: RecordFilter {
                tiers,
                content_types: query.content_types.clone().unwrap_or_default(),
                scope: query.scope.clone(),
                timeframe: query.timeframe.clone(),
                live_at: Some(now),
            },
            max_results: max_results as usize,
            candidate_limit,
            threshold,
            weights,
            use_vector: query.use_vector_search.unwrap_or(true),
            hybrid: query.hybrid_search.unwrap_or(true),
            include_metadata: query.include_metadata.unwrap_or(false),
            include_knowledge_graph: query.include_knowledge_graph.unwrap_or(false),
        })
    }
}

/// A merged record with its per-channel scores. A missing channel is `None`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: MemoryRecord,
    pub vector_score: Option<f32>,
    pub text_score: Option<f32>,
}

impl Candidate {
    pub fn combined(&self, weights: Weights) -> f32 {
        self.vector_score.unwrap_or(0.0) * weights.vector
            + self.text_score.unwrap_or(0.0) * weights.text
    }

    pub fn source(&self) -> ResultSource {
        match (self.vector_score.is_some(), self.text_score.is_some()) {
            (true, true) => ResultSource::Hybrid,
            (true, false) => ResultSource::Vector,
            _ => ResultSource::Text,
        }
    }
}

/// A candidate that passed the threshold, with its combined score.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub record: MemoryRecord,
    pub relevance: f32,
    pub source: ResultSource,
}

/// Output of [`rank`].
#[derive(Debug, Clone)]
pub struct Ranking {
    pub hits: Vec<RankedHit>,
    /// Hits at or above the threshold, counted before truncation to
    /// `max_results`. Candidates dropped by the threshold are not counted.
    pub total_count: usize,
}

/// Merge both channels by record id.
pub fn merge(vector: Vec<(MemoryRecord, f32)>, text: Vec<(MemoryRecord, f32)>) -> Vec<Candidate> {
    let mut merged: BTreeMap<_, Candidate> = BTreeMap::new();
    for (record, score) in vector {
        merged
            .entry(record.id)
            .and_modify(|c| c.vector_score = Some(score))
            .or_insert(Candidate {
                record,
                vector_score: Some(score),
                text_score: None,
            });
    }
    for (record, score) in text {
        merged
            .entry(record.id)
            .and_modify(|c| c.text_score = Some(score))
            .or_insert(Candidate {
                record,
                vector_score: None,
                text_score: Some(score),
            });
    }
    merged.into_values().collect()
}

/// Ranking order: relevance descending, then newest first, then id.
pub fn compare_hits(a: &RankedHit, b: &RankedHit) -> Ordering {
    b.relevance
        .total_cmp(&a.relevance)
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

/// Score, threshold, sort, and truncate merged candidates.
pub fn rank(
    candidates: Vec<Candidate>,
    weights: Weights,
    threshold: f32,
    max_results: usize,
) -> Ranking {
    let mut hits: Vec<RankedHit> = candidates
        .into_iter()
        .filter_map(|c| {
            let relevance = c.combined(weights);
            (relevance >= threshold).then(|| RankedHit {
                source: c.source(),
                record: c.record,
                relevance,
            })
        })
        .collect();
    let total_count = hits.len();
    hits.sort_by(compare_hits);
    hits.truncate(max_results);
    Ranking { hits, total_count }
}

/// Count results by tier, content type, and creation month.
pub fn compute_facets(results: &[SearchResult]) -> SearchFacets {
    let mut facets = SearchFacets::default();
    for r in results {
        *facets.memory_types.entry(r.tier.to_string()).or_default() += 1;
        *facets.content_types.entry(r.content_type.clone()).or_default() += 1;
        *facets
            .time_distribution
            .entry(r.timestamp.format("%Y-%m").to_string())
            .or_default() += 1;
    }
    facets
}

fn cancelled() -> MemoryError {
    MemoryError::TransientRetrievalFailure("search cancelled".to_string())
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, MemoryError>>,
) -> Result<T, MemoryError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        result = fut => result,
    }
}

/// The hybrid retrieval engine.
///
/// Generic over its collaborators so tests can inject fakes; the binary
/// wires the SQLite store and a boxed embedder.
pub struct HybridRetrievalEngine<S, E, T, K>
where
    S: MemoryStore,
    E: Embedder,
    T: TextScorer,
    K: KnowledgeEnricher,
{
    store: Arc<S>,
    embedder: Arc<E>,
    scorer: T,
    enricher: K,
    config: SearchConfig,
}

impl<S, E, T, K> HybridRetrievalEngine<S, E, T, K>
where
    S: MemoryStore,
    E: Embedder,
    T: TextScorer,
    K: KnowledgeEnricher,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, scorer: T, enricher: K, config: SearchConfig) -> Self {
        Self {
            store,
            embedder,
            scorer,
            enricher,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run a search with no external cancellation.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, MemoryError> {
        self.search_with_cancel(query, &CancellationToken::new()).await
    }

    /// Run a search that aborts both sub-queries when `cancel` fires.
    ///
    /// Cancellation surfaces as `TransientRetrievalFailure` without a
    /// text-only retry.
    pub async fn search_with_cancel(
        &self,
        query: SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, MemoryError> {
        let started = Instant::now();
        let plan = SearchPlan::resolve(&query, &self.config, Utc::now())?;

        let span = info_span!(
            "memory.search",
            memory.search.path = field::Empty,
            memory.search.result_count = field::Empty,
            memory.search.total_count = field::Empty,
            memory.search.max_results = plan.max_results,
        );

        let (ranking, path) = self
            .ranked(&plan, cancel)
            .instrument(span.clone())
            .await?;

        let mut results: Vec<SearchResult> = ranking
            .hits
            .iter()
            .map(|h| SearchResult::from_record(&h.record, h.relevance, h.source, plan.include_metadata))
            .collect();
        let facets = compute_facets(&results);

        if plan.include_knowledge_graph && !ranking.hits.is_empty() {
            let records: Vec<MemoryRecord> = ranking.hits.iter().map(|h| h.record.clone()).collect();
            match self.enricher.related(&records).instrument(span.clone()).await {
                Ok(related) => {
                    for result in &mut results {
                        if let Some(ids) = related.get(&result.id) {
                            result.related = ids.clone();
                        }
                    }
                }
                Err(e) => {
                    let _enter = span.enter();
                    warn!(error = %e, "knowledge graph enrichment failed, returning results unenriched");
                }
            }
        }

        span.record("memory.search.path", path.as_str());
        span.record("memory.search.result_count", results.len());
        span.record("memory.search.total_count", ranking.total_count);

        Ok(SearchResponse {
            total_count: ranking.total_count as u32,
            results,
            search_params: query,
            execution_time_ms: started.elapsed().as_millis() as u64,
            facets,
            search_path: path,
        })
    }

    /// Pick the path, apply the failure ladder, and rank.
    async fn ranked(
        &self,
        plan: &SearchPlan,
        cancel: &CancellationToken,
    ) -> Result<(Ranking, SearchPath), MemoryError> {
        if plan.use_vector {
            match self.hybrid_candidates(plan, cancel).await {
                Ok(Some(candidates)) => {
                    let ranking = rank(candidates, plan.weights, plan.threshold, plan.max_results);
                    return Ok((ranking, SearchPath::Hybrid));
                }
                Ok(None) => {}
                Err(_) if cancel.is_cancelled() => return Err(cancelled()),
                Err(e) => {
                    warn!(error = %e, "hybrid search failed, retrying text-only");
                }
            }
            let ranking = self.text_only(plan, cancel).await?;
            return Ok((ranking, SearchPath::Degraded));
        }

        let ranking = self.text_only(plan, cancel).await?;
        Ok((ranking, SearchPath::TextOnly))
    }

    async fn text_only(
        &self,
        plan: &SearchPlan,
        cancel: &CancellationToken,
    ) -> Result<Ranking, MemoryError> {
        let text = cancellable(cancel, self.text_candidates(plan))
            .await
            .map_err(|e| match e {
                MemoryError::TransientRetrievalFailure(_) => e,
                other => MemoryError::TransientRetrievalFailure(other.to_string()),
            })?;
        let candidates = merge(Vec::new(), text);
        Ok(rank(candidates, Weights::TEXT_ONLY, plan.threshold, plan.max_results))
    }

    /// Candidates from both channels, or `None` when the query could not be
    /// embedded.
    async fn hybrid_candidates(
        &self,
        plan: &SearchPlan,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Candidate>>, MemoryError> {
        let query_vector = match cancellable(cancel, self.embed_query(&plan.text)).await {
            Ok(v) => v,
            Err(MemoryError::EmbeddingUnavailable(reason)) => {
                warn!(reason = %reason, "query embedding unavailable, degrading to text-only");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let vector_fut = self.vector_candidates(plan, query_vector);
        let text_fut = async {
            if plan.hybrid {
                self.text_candidates(plan).await
            } else {
                Ok(Vec::new())
            }
        };
        let (vector, text) =
            cancellable(cancel, async { Ok(tokio::join!(vector_fut, text_fut)) }).await?;
        let (vector, text) = (vector?, text?);
        debug!(
            vector_hits = vector.len(),
            text_hits = text.len(),
            "sub-queries joined"
        );
        Ok(Some(merge(vector, text)))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let deadline = Duration::from_millis(self.config.embed_timeout_ms);
        match tokio::time::timeout(deadline, embed_one(self.embedder.as_ref(), text)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MemoryError::EmbeddingUnavailable(format!(
                "query embedding timed out after {}ms",
                self.config.embed_timeout_ms
            ))),
        }
    }

    async fn vector_candidates(
        &self,
        plan: &SearchPlan,
        query_vector: Vec<f32>,
    ) -> Result<Vec<(MemoryRecord, f32)>, MemoryError> {
        let mut query = RecordQuery::new(
            plan.filter.clone(),
            RecordOrder::NearestTo(query_vector.clone()),
            plan.candidate_limit,
        );
        query.has_embedding = Some(true);
        query.scan_limit = Some(self.config.scan_limit.max(plan.candidate_limit));

        let rows = self.store.query(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|record| {
                let similarity =
                    cosine_similarity(&query_vector, record.embedding.as_deref()?);
                Some((record, similarity.clamp(0.0, 1.0)))
            })
            .collect())
    }

    /// Every keyword match (up to `scan_limit`), scored by the text scorer
    /// and cut to `candidate_limit` by that score.
    async fn text_candidates(
        &self,
        plan: &SearchPlan,
    ) -> Result<Vec<(MemoryRecord, f32)>, MemoryError> {
        let scan_limit = self.config.scan_limit.max(plan.candidate_limit);
        let query = RecordQuery::new(
            plan.filter.clone(),
            RecordOrder::TextRelevance(plan.text.clone()),
            scan_limit,
        );
        let rows = self.store.query(&query).await?;
        if rows.len() >= scan_limit as usize {
            debug!(scan_limit, "text scan limit reached");
        }

        let mut scored: Vec<(MemoryRecord, f32)> = rows
            .into_iter()
            .filter_map(|record| {
                let score = self.scorer.score(&plan.text, &record);
                (score > 0.0).then_some((record, score))
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(plan.candidate_limit as usize);
        Ok(scored)
    }
}
