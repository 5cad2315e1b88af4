//! Workflow definition handlers: create, list, show, execute and list runs.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use sentinel_types::workflow::{
    CreateWorkflowRequest, ExecutionSnapshot, ExecutionStarted, WorkflowCreated,
    WorkflowDefinition, WorkflowPage,
};

use crate::http::error::AppError;
use crate::http::extractors::query::{ExecutionListQuery, WorkflowListQuery, parse_id};
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/workflows - Validate and store a workflow definition.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, ApiResponse<WorkflowCreated>), AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let created = state.workflow_service.create_workflow(body).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let self_link = format!("/api/v1/workflows/{}", created.id);
    let execute_link = format!("{self_link}/execute");
    let resp = ApiResponse::success(created, request_id, elapsed)
        .with_link("self", &self_link)
        .with_link("execute", &execute_link);

    Ok((StatusCode::CREATED, resp))
}

/// GET /api/v1/workflows - Page through stored definitions, newest first.
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<WorkflowListQuery>,
) -> Result<ApiResponse<WorkflowPage>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let page = state
        .workflow_service
        .list_workflows(query.limit, query.offset)
        .await?;
    let elapsed = start.elapsed().as_millis() as u64;

    Ok(ApiResponse::success(page, request_id, elapsed).with_link("self", "/api/v1/workflows"))
}

/// GET /api/v1/workflows/{id} - Fetch a stored definition.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<WorkflowDefinition>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();
    let id = parse_id(&id)?;

    let def = state.workflow_service.get_workflow(&id).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let self_link = format!("/api/v1/workflows/{id}");
    let executions_link = format!("{self_link}/executions");
    Ok(ApiResponse::success(def, request_id, elapsed)
        .with_link("self", &self_link)
        .with_link("executions", &executions_link))
}

/// POST /api/v1/workflows/{id}/execute - Start an execution in the background.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, ApiResponse<ExecutionStarted>), AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();
    let id = parse_id(&id)?;

    let started = state.workflow_service.execute_workflow(&id).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let execution_link = format!("/api/v1/executions/{}", started.execution_id);
    let resp = ApiResponse::success(started, request_id, elapsed).with_link("execution", &execution_link);

    Ok((StatusCode::ACCEPTED, resp))
}

/// GET /api/v1/workflows/{id}/executions - Recent executions, newest first.
pub async fn list_workflow_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<ApiResponse<Vec<ExecutionSnapshot>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();
    let id = parse_id(&id)?;

    let executions = state
        .workflow_service
        .list_workflow_executions(&id, query.limit)
        .await?;
    let elapsed = start.elapsed().as_millis() as u64;

    Ok(ApiResponse::success(executions, request_id, elapsed)
        .with_link("workflow", &format!("/api/v1/workflows/{id}")))
}
