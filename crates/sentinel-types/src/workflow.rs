//! Workflow domain types for Sentinel.
//!
//! Defines the stored workflow definition (`WorkflowDefinition` and its
//! `WorkflowStep`s), the execution tracking types (`WorkflowExecution`,
//! `StepResult`, `StepAttempt`), and the summary shapes returned by the
//! workflow service API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A named, versioned template of steps and their dependencies.
///
/// Immutable once stored: every execution references the stored copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version string (free-form, e.g. "1.0.0").
    #[serde(default)]
    pub version: String,
    /// Ordered list of steps forming the workflow DAG.
    pub steps: Vec<WorkflowStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single step in the workflow DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step ID referenced by `depends_on`. Derived from the name when omitted.
    #[serde(default)]
    pub id: String,
    /// Human-readable step name, unique within a definition.
    pub name: String,
    /// The tool this step invokes.
    #[serde(alias = "tool_name")]
    pub tool: String,
    /// Opaque arguments handed to the tool.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
    /// Step IDs that must complete before this step starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Per-attempt timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WorkflowStep {
    /// Create a step with no dependencies, no retries and no timeout.
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tool: tool.into(),
            arguments: Map::new(),
            depends_on: Vec::new(),
            retry_count: 0,
            timeout_ms: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_argument(mut self, key: &str, value: Value) -> Self {
        self.arguments.insert(key.to_string(), value);
        self
    }
}

/// Payload accepted by `create_workflow`. Identity and timestamps are
/// assigned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

/// Status of an individual step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Interrupted by cancellation of the execution.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Execution error
// ---------------------------------------------------------------------------

/// Stable error codes recorded on a terminated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorCode {
    /// A step exhausted its retry budget.
    ExecutionFailed,
    /// No remaining step can ever become ready (cycle or dangling reference).
    WorkflowStuck,
    /// A checkpoint could not be persisted.
    CheckpointFailed,
    Cancelled,
}

/// Terminal error attached to a failed or cancelled execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: ExecutionErrorCode,
    pub message: String,
    /// The step the failure is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow execution
// ---------------------------------------------------------------------------

/// One concrete run of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// ID of the definition being executed.
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Overall progress, 0-100, never decreasing.
    pub progress: u8,
    /// One result per definition step, index-aligned with `WorkflowDefinition.steps`.
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl WorkflowExecution {
    /// Build a fresh `Pending` execution with one `Pending` result per step.
    pub fn new(definition: &WorkflowDefinition) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: definition.id,
            status: ExecutionStatus::Pending,
            started_at: Some(Utc::now()),
            completed_at: None,
            progress: 0,
            steps: definition
                .steps
                .iter()
                .map(|s| StepResult::pending(&s.id))
                .collect(),
            error: None,
        }
    }

    pub fn completed_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// `100 * completed / total`, with an empty execution counting as 0.
    pub fn computed_progress(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        ((self.completed_step_count() * 100) / self.steps.len()) as u8
    }

    /// Read-only summary returned by `get_workflow_execution`.
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            id: self.id,
            workflow_id: self.workflow_id,
            status: self.status,
            progress: self.progress,
            started_at: self.started_at,
            completed_at: self.completed_at,
            total_steps: self.steps.len(),
            error: self.error.clone(),
        }
    }
}

/// Result of executing a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Retries consumed (attempts made minus one).
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-attempt history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<StepAttempt>,
}

impl StepResult {
    pub fn pending(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Pending,
            output: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            retry_count: 0,
            error: None,
            attempts: Vec::new(),
        }
    }
}

/// A single attempt at running a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttempt {
    /// Attempt number (1-based).
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Service API summaries
// ---------------------------------------------------------------------------

/// Returned by `create_workflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCreated {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
    /// Always `"created"`.
    pub status: String,
}

/// Listing entry for a stored definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(def: &WorkflowDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name.clone(),
            description: def.description.clone(),
            version: def.version.clone(),
            step_count: def.steps.len(),
            created_at: def.created_at,
        }
    }
}

/// One page of stored definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPage {
    pub workflows: Vec<WorkflowSummary>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Returned by `execute_workflow`; the execution continues in the background.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStarted {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub step_count: usize,
}

/// Read-only execution summary returned by `get_workflow_execution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

/// Returned by `update_workflow_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub updated_at: DateTime<Utc>,
}
