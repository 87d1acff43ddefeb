//! Axum router configuration with middleware.
//!
//! All memory routes are under `/api/v1/`. Middleware: CORS, HTTP tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/memories",
            post(handlers::memory::create_memory).get(handlers::memory::list_memories),
        )
        .route("/memories/search", post(handlers::memory::search_memories))
        .route("/memories/context", post(handlers::memory::conversation_context))
        .route(
            "/memories/backfill",
            post(handlers::memory::run_backfill).get(handlers::memory::backfill_status),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness check.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
