//! BoxEmbedder -- object-safe dynamic dispatch wrapper for Embedder.
//!
//! 1. Define an object-safe `EmbedderDyn` trait with boxed futures
//! 2. Blanket-impl `EmbedderDyn` for all `T: Embedder`
//! 3. `BoxEmbedder` wraps `Box<dyn EmbedderDyn>` and implements `Embedder`
//!    again, so generic services accept it like any concrete provider

use std::future::Future;
use std::pin::Pin;

use memoria_types::error::EmbeddingError;

use super::embedder::Embedder;

type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, EmbeddingError>> + Send + 'a>>;

/// Object-safe version of [`Embedder`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `Embedder`.
pub trait EmbedderDyn: Send + Sync {
    fn embed_boxed<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a>;

    fn model_name_dyn(&self) -> &str;

    fn dimension_dyn(&self) -> usize;
}

impl<T: Embedder> EmbedderDyn for T {
    fn embed_boxed<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
        Box::pin(self.embed(texts))
    }

    fn model_name_dyn(&self) -> &str {
        self.model_name()
    }

    fn dimension_dyn(&self) -> usize {
        self.dimension()
    }
}

/// Type-erased embedder for runtime selection.
///
/// The provider (hashing or HTTP) is chosen from configuration at startup;
/// `BoxEmbedder` lets the rest of the application name a single type.
pub struct BoxEmbedder {
    inner: Box<dyn EmbedderDyn + Send + Sync>,
}

impl BoxEmbedder {
    /// Wrap a concrete `Embedder` in a type-erased box.
    pub fn new<T: Embedder + 'static>(embedder: T) -> Self {
        Self {
            inner: Box::new(embedder),
        }
    }
}

impl Embedder for BoxEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_boxed(texts).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name_dyn()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension_dyn()
    }
}

impl std::fmt::Debug for BoxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxEmbedder")
            .field("model", &self.model_name())
            .field("dimension", &self.dimension())
            .finish()
    }
}
