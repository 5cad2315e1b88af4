//! Workflow definition parsing and validation.
//!
//! Converts YAML/JSON files into `CreateWorkflowRequest`s, normalizes step
//! IDs, and validates structural constraints (name, step names, tool
//! references, dependency graph) before a definition is stored.

use std::collections::HashSet;
use std::path::Path;

use sentinel_types::workflow::{CreateWorkflowRequest, WorkflowStep};
use thiserror::Error;

use super::dag::validate_dag;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a workflow creation request.
///
/// Only deserializes; validation happens in `create_workflow`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<CreateWorkflowRequest, WorkflowError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Parse a JSON string into a workflow creation request.
pub fn parse_workflow_json(json: &str) -> Result<CreateWorkflowRequest, WorkflowError> {
    serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load a workflow request from a `.yaml`, `.yml` or `.json` file.
pub fn load_workflow_file(path: &Path) -> Result<CreateWorkflowRequest, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_workflow_json(&content),
        _ => parse_workflow_yaml(&content),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Derive a step ID from its name: lower-case, whitespace runs become `-`.
pub fn step_id_from_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Fill in missing step IDs from step names.
pub fn normalize_steps(steps: &mut [WorkflowStep]) {
    for step in steps.iter_mut() {
        if step.id.trim().is_empty() {
            step.id = step_id_from_name(&step.name);
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a workflow creation request.
///
/// Checks:
/// - Name is non-empty
/// - At least one step exists
/// - Every step has a name, unique within the definition
/// - Every step has a non-empty ID, unique within the definition
/// - Every step references a tool
/// - `depends_on` references resolve and the graph is acyclic
///
/// Expects step IDs to be normalized already (see `normalize_steps`).
pub fn validate_request(req: &CreateWorkflowRequest) -> Result<(), WorkflowError> {
    if req.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name is required".to_string(),
        ));
    }

    validate_steps(&req.steps)?;
    validate_dag(&req.steps)
}

/// Per-step checks shared by creation and tests.
pub fn validate_steps(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    if steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    for (i, step) in steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step {i}: name is required"
            )));
        }
        if !names.insert(step.name.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "step {i}: duplicate step name '{}'",
                step.name
            )));
        }
        if step.id.trim().is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step {i} ({}): id is required",
                step.name
            )));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "step {i}: duplicate step id '{}'",
                step.id
            )));
        }
        if step.tool.trim().is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step {i} ({}): tool name is required",
                step.name
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
