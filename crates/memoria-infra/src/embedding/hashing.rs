//! Deterministic local embedder.
//!
//! Hashes each token with 64-bit FNV-1a into a fixed number of signed
//! buckets and L2-normalizes the result. Texts sharing tokens get positive
//! cosine similarity; no network or model files are needed.

use memoria_core::memory::embedder::Embedder;
use memoria_core::memory::scorer::tokenize;
use memoria_types::error::EmbeddingError;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed one text. Text without tokens yields the zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        "fnv1a-hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
