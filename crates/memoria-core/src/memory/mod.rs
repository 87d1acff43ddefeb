//! Hybrid contextual memory for Memoria.
//!
//! Ports (`MemoryStore`, `Embedder`, `TextScorer`, `KnowledgeEnricher`) are
//! implemented by memoria-infra or by callers; everything else here is pure
//! orchestration over them: the hybrid retrieval engine, the writer, the
//! embedding backfill reconciler, and the insight policy.

pub mod box_embedder;
pub mod embedder;
pub mod engine;
pub mod enricher;
pub mod insight;
pub mod reconciler;
pub mod scorer;
pub mod service;
pub mod store;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;
