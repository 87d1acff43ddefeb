//! Embedding provider implementations.
//!
//! [`build_embedder`] picks the provider named in `[embedding]` and wraps it
//! in a [`BoxEmbedder`] so the rest of the application names a single type.

pub mod hashing;
pub mod http;

use std::time::Duration;

use memoria_core::memory::box_embedder::BoxEmbedder;
use memoria_types::config::{EmbeddingConfig, EmbeddingProviderKind};
use memoria_types::error::EmbeddingError;
use secrecy::SecretString;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

/// Construct the configured embedding provider.
///
/// The HTTP provider reads its API key from the environment variable named
/// by `api_key_env`; a missing key sends unauthenticated requests, which
/// local OpenAI-compatible servers accept.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<BoxEmbedder, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::Hashing => {
            tracing::info!(dimension = config.dimension, "using hashing embedder");
            Ok(BoxEmbedder::new(HashingEmbedder::new(config.dimension)))
        }
        EmbeddingProviderKind::Http => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from);
            if api_key.is_none() {
                tracing::warn!(
                    env = %config.api_key_env,
                    "no embedding API key set, sending unauthenticated requests"
                );
            }
            let provider = HttpEmbedder::new(
                config.base_url.clone(),
                config.model.clone(),
                config.dimension,
                api_key,
                Duration::from_millis(config.request_timeout_ms),
            )?;
            tracing::info!(base_url = %config.base_url, model = %config.model, "using HTTP embedder");
            Ok(BoxEmbedder::new(provider))
        }
    }
}
