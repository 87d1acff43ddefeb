//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use memoria_types::error::MemoryError;

use crate::http::response::ApiResponse;

/// Handler error rendered as an error envelope.
#[derive(Debug)]
pub enum AppError {
    Memory(MemoryError),
    Validation(String),
}

impl From<MemoryError> for AppError {
    fn from(e: MemoryError) -> Self {
        AppError::Memory(e)
    }
}

impl AppError {
    /// Status code and machine-readable error code.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) | AppError::Memory(MemoryError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Memory(MemoryError::ReconcileInProgress) => {
                (StatusCode::CONFLICT, "RECONCILE_IN_PROGRESS")
            }
            AppError::Memory(MemoryError::TransientRetrievalFailure(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "RETRIEVAL_UNAVAILABLE")
            }
            AppError::Memory(MemoryError::EmbeddingUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_UNAVAILABLE")
            }
            AppError::Memory(MemoryError::WriteFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILED")
            }
            AppError::Memory(MemoryError::StoreQueryFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            AppError::Memory(MemoryError::EnrichmentFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ENRICHMENT_FAILED")
            }
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Memory(e) => e.to_string(),
            AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::warn!(code, error = %self.message(), "request failed");
        }
        let body = ApiResponse::error(code, &self.message(), uuid::Uuid::now_v7().to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn memory_errors_map_to_documented_statuses() {
        assert_eq!(
            status_of(MemoryError::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(MemoryError::ReconcileInProgress.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(MemoryError::TransientRetrievalFailure("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(MemoryError::WriteFailed("disk".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn handler_validation_is_bad_request() {
        let (status, code) = AppError::Validation("limit".into()).classify();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
    }
}
