//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Definitions
        .route(
            "/workflows",
            post(handlers::workflow::create_workflow).get(handlers::workflow::list_workflows),
        )
        .route("/workflows/{id}", get(handlers::workflow::get_workflow))
        .route(
            "/workflows/{id}/execute",
            post(handlers::workflow::execute_workflow),
        )
        .route(
            "/workflows/{id}/executions",
            get(handlers::workflow::list_workflow_executions),
        )
        // Executions
        .route("/executions/{id}", get(handlers::execution::get_execution))
        .route(
            "/executions/{id}/steps",
            get(handlers::execution::get_execution_steps),
        )
        .route(
            "/executions/{id}/status",
            post(handlers::execution::update_execution_status),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus the number of in-flight executions.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_executions": state.workflow_service.active_count().await,
    }))
}
