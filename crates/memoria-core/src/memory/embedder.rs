//! Embedder trait for text-to-vector conversion.
//!
//! Defines the interface for embedding text into vectors for semantic search,
//! plus the similarity measure used to rank against a query vector.
//! Implementations (HTTP providers, local hashing) live in memoria-infra.

use memoria_types::error::EmbeddingError;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Embedder: Send + Sync {
    /// Embed one or more texts into vectors.
    ///
    /// Returns one vector per input text, in input order.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, EmbeddingError>> + Send;

    /// The model name used for embeddings (e.g., "text-embedding-3-small").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}

/// Embed a single text.
pub async fn embed_one<E: Embedder + ?Sized>(
    embedder: &E,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    match vectors.pop() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EmbeddingError::Unavailable(
            "provider returned no vector".to_string(),
        )),
    }
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when either vector is empty, the dimensions differ, or either
/// vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    ((dot / denom) as f32).clamp(-1.0, 1.0)
}
