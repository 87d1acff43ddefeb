use thiserror::Error;

/// Errors from repository operations (used by the store trait in memoria-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from an embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request timed out after {0}ms")]
    Timeout(u64),

    #[error("embedding provider rate limited")]
    RateLimited,
}

/// Errors surfaced by memory retrieval, writes, and backfill.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Query embedding could not be computed. Triggers text-only fallback.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A store query failed. Triggers text-only fallback during search.
    #[error("store query failed: {0}")]
    StoreQueryFailed(String),

    /// Both the hybrid and the text-only paths failed.
    #[error("retrieval failed: {0}")]
    TransientRetrievalFailure(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Knowledge-graph enrichment failed. Never returned from search.
    #[error("enrichment failed: {0}")]
    EnrichmentFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("embedding backfill already in progress")]
    ReconcileInProgress,
}

impl From<EmbeddingError> for MemoryError {
    fn from(err: EmbeddingError) -> Self {
        MemoryError::EmbeddingUnavailable(err.to_string())
    }
}

impl From<RepositoryError> for MemoryError {
    fn from(err: RepositoryError) -> Self {
        MemoryError::StoreQueryFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_repository_error_conflict_maps_to_store_query_failed() {
        let err: MemoryError = RepositoryError::Conflict("memory 'x' already exists".to_string()).into();
        assert_eq!(
            err.to_string(),
            "store query failed: conflict: memory 'x' already exists"
        );
    }

    #[test]
    fn test_embedding_error_maps_to_unavailable() {
        let err: MemoryError = EmbeddingError::Timeout(1500).into();
        match err {
            MemoryError::EmbeddingUnavailable(msg) => assert!(msg.contains("1500ms")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_repository_error_maps_to_store_query_failed() {
        let err: MemoryError = RepositoryError::Connection.into();
        assert!(matches!(err, MemoryError::StoreQueryFailed(_)));
        assert_eq!(err.to_string(), "store query failed: database connection error");
    }
}
