//! Query and body types for the workflow endpoints.

use serde::Deserialize;
use uuid::Uuid;

use crate::http::error::AppError;

/// Query parameters for `GET /workflows`.
#[derive(Debug, Deserialize, Default)]
pub struct WorkflowListQuery {
    /// Page size; 0 or absent means the default, capped at 100.
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Query parameters for `GET /workflows/{id}/executions`.
#[derive(Debug, Deserialize, Default)]
pub struct ExecutionListQuery {
    #[serde(default = "default_execution_limit")]
    pub limit: u32,
}

fn default_execution_limit() -> u32 {
    20
}

/// Body of `POST /executions/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    pub status: String,
}

/// Parse a path segment as a UUID, reporting a validation error otherwise.
pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("'{raw}' is not a valid id")))
}
