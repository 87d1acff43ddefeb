//! Global configuration types for Memoria.
//!
//! `MemoriaConfig` represents the top-level `config.toml` in the data
//! directory. Every section and field has a default, so an empty or partial
//! file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.memoria/config.toml` (or `$MEMORIA_DATA_DIR/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoriaConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub insight: InsightConfig,
}

/// Defaults and limits for hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub default_max_results: u32,
    /// Hard ceiling applied to any requested `maxResults`.
    #[serde(default = "default_max_results_ceiling")]
    pub max_results_ceiling: u32,
    /// Minimum number of candidates pulled from each sub-query.
    #[serde(default = "default_candidate_floor")]
    pub candidate_floor: u32,
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_text_weight")]
    pub text_weight: f32,
    /// Deadline for embedding the query text.
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
    /// Upper bound on rows each channel examines before ranking. The text
    /// channel scores every keyword match up to this bound; the vector
    /// channel compares the newest embedded rows up to this bound.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: u32,
}

fn default_max_results() -> u32 {
    10
}

fn default_max_results_ceiling() -> u32 {
    100
}

fn default_candidate_floor() -> u32 {
    20
}

fn default_threshold() -> f32 {
    0.6
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_text_weight() -> f32 {
    0.3
}

fn default_embed_timeout_ms() -> u64 {
    2_000
}

fn default_scan_limit() -> u32 {
    5_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            max_results_ceiling: default_max_results_ceiling(),
            candidate_floor: default_candidate_floor(),
            default_threshold: default_threshold(),
            vector_weight: default_vector_weight(),
            text_weight: default_text_weight(),
            embed_timeout_ms: default_embed_timeout_ms(),
            scan_limit: default_scan_limit(),
        }
    }
}

/// Which embedding backend to construct at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local deterministic token hashing. Works offline.
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_api_key_env() -> String {
    "MEMORIA_EMBEDDING_API_KEY".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            dimension: default_dimension(),
            api_key_env: default_api_key_env(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Embedding backfill batching and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Items embedded concurrently within one chunk.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Pause between chunks.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Six-field cron expression (seconds first).
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> u32 {
    50
}

fn default_concurrency() -> usize {
    5
}

fn default_chunk_delay_ms() -> u64 {
    100
}

fn default_schedule() -> String {
    "0 */15 * * * *".to_string()
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            chunk_delay_ms: default_chunk_delay_ms(),
            schedule: default_schedule(),
        }
    }
}

/// Derived "insight" records written after long primary writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Content length (in chars) above which an insight is derived.
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
    /// Length (in chars) of the excerpt stored in the insight.
    #[serde(default = "default_excerpt_len")]
    pub excerpt_len: usize,
}

fn default_min_content_len() -> usize {
    500
}

fn default_excerpt_len() -> usize {
    200
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_content_len: default_min_content_len(),
            excerpt_len: default_excerpt_len(),
        }
    }
}
