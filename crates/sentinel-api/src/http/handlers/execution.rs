//! Execution handlers: status, step results and external status changes.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use sentinel_types::workflow::{ExecutionSnapshot, StatusUpdate, StepResult};

use crate::http::error::AppError;
use crate::http::extractors::query::{StatusUpdateBody, parse_id};
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/executions/{id} - Execution summary.
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ExecutionSnapshot>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();
    let id = parse_id(&id)?;

    let snapshot = state.workflow_service.get_workflow_execution(&id).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let workflow_link = format!("/api/v1/workflows/{}", snapshot.workflow_id);
    Ok(ApiResponse::success(snapshot, request_id, elapsed)
        .with_link("self", &format!("/api/v1/executions/{id}"))
        .with_link("steps", &format!("/api/v1/executions/{id}/steps"))
        .with_link("workflow", &workflow_link))
}

/// GET /api/v1/executions/{id}/steps - Per-step results with attempt history.
pub async fn get_execution_steps(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<StepResult>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();
    let id = parse_id(&id)?;

    let execution = state.workflow_service.get_execution_detail(&id).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    Ok(ApiResponse::success(execution.steps, request_id, elapsed)
        .with_link("execution", &format!("/api/v1/executions/{id}")))
}

/// POST /api/v1/executions/{id}/status - Cancel or complete an execution.
pub async fn update_execution_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdateBody>,
) -> Result<ApiResponse<StatusUpdate>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();
    let id = parse_id(&id)?;

    let update = state
        .workflow_service
        .update_workflow_status(&id, &body.status)
        .await?;
    let elapsed = start.elapsed().as_millis() as u64;

    Ok(ApiResponse::success(update, request_id, elapsed)
        .with_link("execution", &format!("/api/v1/executions/{id}")))
}
