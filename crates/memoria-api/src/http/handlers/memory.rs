//! Memory record handlers for the REST API.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use memoria_types::memory::{ListQuery, MemoryRecord, MemoryScope, WriteRequest, WriteResponse};
use memoria_types::reconcile::{ReconcileReport, ReconcileRequest, ReconcilerState};
use memoria_types::search::{ContextRequest, SearchQuery, SearchResponse};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Query parameters for `GET /memories`.
///
/// Kept flat (no `#[serde(flatten)]`) so numeric values parse from the
/// query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryListParams {
    pub memory_type: Option<String>,
    pub content_type: Option<String>,
    pub owner_id: Option<String>,
    pub session_id: Option<String>,
    pub conversation_id: Option<String>,
    pub topic_id: Option<String>,
    pub limit: Option<u32>,
}

impl From<MemoryListParams> for ListQuery {
    fn from(p: MemoryListParams) -> Self {
        ListQuery {
            memory_type: p.memory_type,
            content_type: p.content_type,
            scope: MemoryScope {
                owner_id: p.owner_id,
                session_id: p.session_id,
                conversation_id: p.conversation_id,
                topic_id: p.topic_id,
            },
            limit: p.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackfillStatus {
    pub state: ReconcilerState,
}

/// POST /api/v1/memories - Store a new memory record.
pub async fn create_memory(
    State(state): State<AppState>,
    Json(body): Json<WriteRequest>,
) -> Result<Json<ApiResponse<WriteResponse>>, AppError> {
    let timer = RequestTimer::start();
    let written = state.memory_service.remember(body).await?;
    Ok(Json(timer.success(written).with_link("collection", "/api/v1/memories")))
}

/// GET /api/v1/memories - Newest-first listing.
pub async fn list_memories(
    State(state): State<AppState>,
    Query(params): Query<MemoryListParams>,
) -> Result<Json<ApiResponse<Vec<MemoryRecord>>>, AppError> {
    let timer = RequestTimer::start();
    let records = state.memory_service.list(params.into()).await?;
    Ok(Json(timer.success(records).with_link("self", "/api/v1/memories")))
}

/// POST /api/v1/memories/search - Hybrid search.
pub async fn search_memories(
    State(state): State<AppState>,
    Json(body): Json<SearchQuery>,
) -> Result<Json<ApiResponse<SearchResponse>>, AppError> {
    let timer = RequestTimer::start();
    let response = state.memory_service.search(body).await?;
    Ok(Json(timer.success(response)))
}

/// POST /api/v1/memories/context - Memories relevant to a conversation.
pub async fn conversation_context(
    State(state): State<AppState>,
    Json(body): Json<ContextRequest>,
) -> Result<Json<ApiResponse<SearchResponse>>, AppError> {
    let timer = RequestTimer::start();
    let response = state.memory_service.context(body).await?;
    Ok(Json(timer.success(response)))
}

/// POST /api/v1/memories/backfill - Run one embedding backfill batch.
pub async fn run_backfill(
    State(state): State<AppState>,
    Json(body): Json<ReconcileRequest>,
) -> Result<Json<ApiResponse<ReconcileReport>>, AppError> {
    let timer = RequestTimer::start();
    let report = state.memory_service.backfill(body).await?;
    Ok(Json(timer.success(report)))
}

/// GET /api/v1/memories/backfill - Current reconciler state.
pub async fn backfill_status(State(state): State<AppState>) -> Json<ApiResponse<BackfillStatus>> {
    let timer = RequestTimer::start();
    Json(timer.success(BackfillStatus {
        state: state.memory_service.backfill_state(),
    }))
}
