//! Workflow service: the public API over definitions and executions.
//!
//! Validation and not-found errors are returned directly. Execution errors
//! never are: `execute_workflow` only reports that the run was scheduled, and
//! the outcome is read back through `get_workflow_execution`.

use std::sync::Arc;

use chrono::Utc;
use sentinel_types::config::EngineConfig;
use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{
    CreateWorkflowRequest, ExecutionError, ExecutionErrorCode, ExecutionSnapshot,
    ExecutionStarted, ExecutionStatus, StatusUpdate, WorkflowCreated, WorkflowDefinition,
    WorkflowExecution, WorkflowPage, WorkflowSummary,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::active::{ActiveExecution, ActiveExecutions};
use super::checkpoint::{CheckpointError, ExecutionTracker};
use super::coordinator::ExecutionCoordinator;
use super::definition::{WorkflowError, normalize_steps, validate_request};
use super::retry::RetryController;
use super::step_runner::StepRunner;
use crate::repository::workflow::WorkflowRepository;

/// Page size used when the caller asks for none.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<WorkflowError> for ServiceError {
    fn from(e: WorkflowError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<CheckpointError> for ServiceError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::Repository(inner) => ServiceError::Repository(inner),
        }
    }
}

/// Clamp a requested page size: 0 means the default, anything above the
/// maximum is cut down to it.
pub fn clamp_limit(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    }
}

// ---------------------------------------------------------------------------
// WorkflowService
// ---------------------------------------------------------------------------

/// Entry point for defining, running, querying and stopping workflows.
pub struct WorkflowService<R: WorkflowRepository, S: StepRunner> {
    repo: Arc<R>,
    runner: Arc<S>,
    active: Arc<ActiveExecutions<R>>,
    config: EngineConfig,
}

impl<R, S> WorkflowService<R, S>
where
    R: WorkflowRepository + 'static,
    S: StepRunner + 'static,
{
    pub fn new(repo: Arc<R>, runner: Arc<S>, config: EngineConfig) -> Self {
        Self {
            repo,
            runner,
            active: Arc::new(ActiveExecutions::new()),
            config,
        }
    }

    /// Number of executions currently in flight in this process.
    pub async fn active_count(&self) -> usize {
        self.active.len().await
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Validate and store a new definition.
    pub async fn create_workflow(
        &self,
        mut req: CreateWorkflowRequest,
    ) -> Result<WorkflowCreated, ServiceError> {
        normalize_steps(&mut req.steps);
        validate_request(&req)?;

        let now = Utc::now();
        let version = if req.version.trim().is_empty() {
            DEFAULT_VERSION.to_string()
        } else {
            req.version
        };
        let def = WorkflowDefinition {
            id: Uuid::now_v7(),
            name: req.name,
            description: req.description,
            version,
            steps: req.steps,
            input_schema: req.input_schema,
            output_schema: req.output_schema,
            created_at: now,
            updated_at: now,
        };
        self.repo.save_definition(&def).await?;

        tracing::info!(
            workflow_id = %def.id,
            name = def.name.as_str(),
            steps = def.steps.len(),
            "workflow created"
        );

        Ok(WorkflowCreated {
            id: def.id,
            name: def.name,
            version: def.version,
            step_count: def.steps.len(),
            created_at: def.created_at,
            status: "created".to_string(),
        })
    }

    pub async fn get_workflow(&self, id: &Uuid) -> Result<WorkflowDefinition, ServiceError> {
        self.repo
            .get_definition(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("workflow {id}")))
    }

    pub async fn list_workflows(&self, limit: u32, offset: u32) -> Result<WorkflowPage, ServiceError> {
        let limit = clamp_limit(limit);
        let (defs, total) = self.repo.list_definitions(limit, offset).await?;
        Ok(WorkflowPage {
            workflows: defs.iter().map(WorkflowSummary::from).collect(),
            total,
            limit,
            offset,
        })
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Start a new execution of a stored definition and return immediately.
    pub async fn execute_workflow(&self, workflow_id: &Uuid) -> Result<ExecutionStarted, ServiceError> {
        let def = self.get_workflow(workflow_id).await?;

        let execution = WorkflowExecution::new(&def);
        self.repo.save_execution(&execution).await?;

        let started = ExecutionStarted {
            execution_id: execution.id,
            workflow_id: def.id,
            status: execution.status,
            started_at: execution.started_at,
            step_count: def.steps.len(),
        };

        let execution_id = execution.id;
        let tracker = Arc::new(ExecutionTracker::new(Arc::clone(&self.repo), execution));
        let cancel = CancellationToken::new();
        self.active
            .insert(
                execution_id,
                ActiveExecution {
                    tracker: Arc::clone(&tracker),
                    cancel: cancel.clone(),
                },
            )
            .await;

        let coordinator = ExecutionCoordinator::new(
            def.id,
            def.steps.into(),
            tracker,
            RetryController::new(
                Arc::clone(&self.runner),
                self.config.retry_backoff(),
                self.config.default_step_timeout(),
            ),
            self.config.parallelism(),
            Arc::clone(&self.active),
            cancel,
        );
        tokio::spawn(coordinator.run());

        tracing::info!(
            execution_id = %execution_id,
            workflow_id = %def.id,
            "workflow execution scheduled"
        );
        Ok(started)
    }

    /// Read-only summary of the persisted execution record.
    pub async fn get_workflow_execution(&self, id: &Uuid) -> Result<ExecutionSnapshot, ServiceError> {
        Ok(self.get_execution_detail(id).await?.snapshot())
    }

    /// Full persisted execution record including per-step results.
    pub async fn get_execution_detail(&self, id: &Uuid) -> Result<WorkflowExecution, ServiceError> {
        self.repo
            .get_execution(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("execution {id}")))
    }

    pub async fn list_workflow_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<ExecutionSnapshot>, ServiceError> {
        self.get_workflow(workflow_id).await?;
        let execs = self
            .repo
            .list_executions(workflow_id, clamp_limit(limit))
            .await?;
        Ok(execs.iter().map(WorkflowExecution::snapshot).collect())
    }

    /// Externally set an execution's status. Only `cancelled` and `completed`
    /// are accepted.
    ///
    /// An in-flight execution has its token cancelled and the status applied
    /// through its tracker. A stored record is updated unless it is already
    /// terminal: repeating its current status is a no-op, asking for a
    /// different one is a conflict.
    pub async fn update_workflow_status(
        &self,
        id: &Uuid,
        status: &str,
    ) -> Result<StatusUpdate, ServiceError> {
        let target: ExecutionStatus = status
            .parse()
            .map_err(ServiceError::InvalidStatus)?;
        if !matches!(target, ExecutionStatus::Cancelled | ExecutionStatus::Completed) {
            return Err(ServiceError::InvalidStatus(format!(
                "status '{status}' cannot be set, expected 'cancelled' or 'completed'"
            )));
        }

        if let Some(handle) = self.active.get(id).await {
            handle.cancel.cancel();
            let applied = handle
                .tracker
                .finalize(target, requested_error(target))
                .await?;
            tracing::info!(
                execution_id = %id,
                status = %target,
                applied,
                "status update requested for active execution"
            );
            if applied {
                return Ok(StatusUpdate {
                    execution_id: *id,
                    status: target,
                    updated_at: Utc::now(),
                });
            }
            let current = handle.tracker.snapshot().await;
            return settled_update(&current, target);
        }

        let mut exec = self.get_execution_detail(id).await?;
        if exec.status.is_terminal() {
            return settled_update(&exec, target);
        }

        let now = Utc::now();
        exec.status = target;
        exec.completed_at = Some(now);
        exec.error = requested_error(target);
        if target == ExecutionStatus::Completed {
            exec.progress = 100;
        }
        self.repo.save_execution(&exec).await?;

        tracing::info!(
            execution_id = %id,
            status = %target,
            "status updated on inactive execution"
        );
        Ok(StatusUpdate {
            execution_id: *id,
            status: target,
            updated_at: now,
        })
    }

    /// Cancel every in-flight execution and wait up to the configured grace
    /// period for them to finish. Returns whether they all did.
    pub async fn shutdown(&self) -> bool {
        let signalled = self.active.cancel_all().await;
        if signalled == 0 {
            return true;
        }
        tracing::info!(executions = signalled, "cancelling active workflow executions");

        let drained = self.active.wait_idle(self.config.shutdown_grace()).await;
        if !drained {
            tracing::warn!(
                remaining = self.active.len().await,
                grace_ms = self.config.shutdown_grace_ms,
                "shutdown grace period elapsed with executions still active"
            );
        }
        drained
    }
}

/// Error recorded when a caller sets the status directly.
fn requested_error(target: ExecutionStatus) -> Option<ExecutionError> {
    (target == ExecutionStatus::Cancelled).then(|| ExecutionError {
        code: ExecutionErrorCode::Cancelled,
        message: "execution cancelled by request".to_string(),
        step_id: None,
    })
}

/// Answer for an execution that is already terminal.
fn settled_update(
    exec: &WorkflowExecution,
    target: ExecutionStatus,
) -> Result<StatusUpdate, ServiceError> {
    if exec.status != target {
        return Err(ServiceError::Conflict(format!(
            "execution {} is already {}",
            exec.id, exec.status
        )));
    }
    Ok(StatusUpdate {
        execution_id: exec.id,
        status: exec.status,
        updated_at: exec.completed_at.unwrap_or_else(Utc::now),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::workflow::step_runner::BuiltinToolRunner;
    use crate::workflow::testing::{MockRepository, ScriptedRunner, definition};
    use sentinel_types::workflow::{StepStatus, WorkflowStep};
    use serde_json::json;

    fn engine_config() -> EngineConfig {
        EngineConfig {
            retry_backoff_ms: 1,
            shutdown_grace_ms: 2_000,
            ..EngineConfig::default()
        }
    }

    fn service(runner: ScriptedRunner) -> (Arc<MockRepository>, WorkflowService<MockRepository, ScriptedRunner>) {
        let repo = Arc::new(MockRepository::new());
        let svc = WorkflowService::new(repo.clone(), Arc::new(runner), engine_config());
        (repo, svc)
    }

    fn request(steps: Vec<WorkflowStep>) -> CreateWorkflowRequest {
        CreateWorkflowRequest {
            name: "pipeline".to_string(),
            description: Some("test pipeline".to_string()),
            version: String::new(),
            steps,
            input_schema: None,
            output_schema: None,
        }
    }

    /// Poll the persisted record until it is terminal.
    async fn wait_terminal<R: WorkflowRepository + 'static, S: StepRunner + 'static>(
        svc: &WorkflowService<R, S>,
        id: &Uuid,
    ) -> WorkflowExecution {
        for _ in 0..500 {
            let exec = svc.get_execution_detail(id).await.unwrap();
            if exec.status.is_terminal() && svc.active_count().await == 0 {
                return exec;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution {id} did not terminate");
    }

    #[tokio::test]
    async fn test_create_workflow_returns_summary() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let created = svc
            .create_workflow(request(vec![WorkflowStep::new("a", "sleep")]))
            .await
            .unwrap();
        assert_eq!(created.status, "created");
        assert_eq!(created.step_count, 1);
        assert_eq!(created.version, "1.0.0");

        let stored = svc.get_workflow(&created.id).await.unwrap();
        assert_eq!(stored.name, "pipeline");
    }

    #[tokio::test]
    async fn test_create_workflow_ids_are_unique() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let a = svc
            .create_workflow(request(vec![WorkflowStep::new("a", "sleep")]))
            .await
            .unwrap();
        let b = svc
            .create_workflow(request(vec![WorkflowStep::new("a", "sleep")]))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_create_workflow_validation_errors() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let err = svc.create_workflow(request(vec![])).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let cyclic = request(vec![
            WorkflowStep::new("a", "sleep").depends_on(["b"]),
            WorkflowStep::new("b", "sleep").depends_on(["a"]),
        ]);
        let err = svc.create_workflow(cyclic).await.unwrap_err();
        assert!(err.to_string().contains("cycle"), "got: {err}");
    }

    #[tokio::test]
    async fn test_list_workflows_clamps_limit() {
        let (_repo, svc) = service(ScriptedRunner::new());
        for _ in 0..3 {
            svc.create_workflow(request(vec![WorkflowStep::new("a", "sleep")]))
                .await
                .unwrap();
        }
        let page = svc.list_workflows(0, 0).await.unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.total, 3);
        assert_eq!(page.workflows.len(), 3);

        let page = svc.list_workflows(1_000, 2).await.unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(page.workflows.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_workflow_is_not_found() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let err = svc.execute_workflow(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_execution_is_not_found() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let err = svc.get_workflow_execution(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_three_independent_steps_complete() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let created = svc
            .create_workflow(request(vec![
                WorkflowStep::new("a", "sleep"),
                WorkflowStep::new("b", "sleep"),
                WorkflowStep::new("c", "sleep"),
            ]))
            .await
            .unwrap();

        let started = svc.execute_workflow(&created.id).await.unwrap();
        assert_eq!(started.status, ExecutionStatus::Pending);
        assert_eq!(started.step_count, 3);

        let exec = wait_terminal(&svc, &started.execution_id).await;
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.progress, 100);
        assert!(exec.steps.iter().all(|s| s.status == StepStatus::Completed));

        let snapshot = svc.get_workflow_execution(&started.execution_id).await.unwrap();
        assert_eq!(snapshot.total_steps, 3);
        assert!(snapshot.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_dependency_blocks_dependent() {
        let (_repo, svc) = service(ScriptedRunner::new().always_fail("a"));
        let created = svc
            .create_workflow(request(vec![
                WorkflowStep::new("a", "sleep").with_retries(2),
                WorkflowStep::new("b", "sleep").depends_on(["a"]),
            ]))
            .await
            .unwrap();

        let started = svc.execute_workflow(&created.id).await.unwrap();
        let exec = wait_terminal(&svc, &started.execution_id).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.steps[0].status, StepStatus::Failed);
        assert_eq!(exec.steps[0].retry_count, 2);
        assert_eq!(exec.steps[1].status, StepStatus::Pending);
        let err = exec.error.unwrap();
        assert_eq!(err.code, ExecutionErrorCode::ExecutionFailed);
        assert_eq!(err.step_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_cancel_shortly_after_execute() {
        let repo = Arc::new(MockRepository::new());
        let svc = WorkflowService::new(repo, Arc::new(BuiltinToolRunner::new()), engine_config());
        let slow = |id: &str| WorkflowStep::new(id, "sleep").with_argument("duration_ms", json!(500));
        let created = svc
            .create_workflow(request(vec![
                slow("a"),
                slow("b").depends_on(["a"]),
                slow("c").depends_on(["b"]),
            ]))
            .await
            .unwrap();

        let started = svc.execute_workflow(&created.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let update = svc
            .update_workflow_status(&started.execution_id, "cancelled")
            .await
            .unwrap();
        assert_eq!(update.status, ExecutionStatus::Cancelled);

        let exec = wait_terminal(&svc, &started.execution_id).await;
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert!(exec.steps.iter().any(|s| s.status != StepStatus::Completed));
        assert_eq!(exec.error.unwrap().code, ExecutionErrorCode::Cancelled);
        assert!(exec.progress < 100);
    }

    #[tokio::test]
    async fn test_cyclic_definition_fails_stuck() {
        let (repo, svc) = service(ScriptedRunner::new());
        // Stored directly: creation would reject the cycle.
        let def = definition(vec![
            WorkflowStep::new("a", "sleep").depends_on(["b"]),
            WorkflowStep::new("b", "sleep").depends_on(["a"]),
        ]);
        repo.save_definition(&def).await.unwrap();

        let started = svc.execute_workflow(&def.id).await.unwrap();
        let exec = wait_terminal(&svc, &started.execution_id).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        let err = exec.error.unwrap();
        assert_eq!(err.code, ExecutionErrorCode::WorkflowStuck);
        assert!(err.message.contains("stuck"));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let (_repo, svc) = service(ScriptedRunner::new().fail_times("flaky", 2));
        let created = svc
            .create_workflow(request(vec![WorkflowStep::new("flaky", "sleep").with_retries(2)]))
            .await
            .unwrap();

        let started = svc.execute_workflow(&created.id).await.unwrap();
        let exec = wait_terminal(&svc, &started.execution_id).await;

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.steps[0].status, StepStatus::Completed);
        assert_eq!(exec.steps[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_update_status_rejects_other_values() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let err = svc
            .update_workflow_status(&Uuid::now_v7(), "running")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatus(_)));

        let err = svc
            .update_workflow_status(&Uuid::now_v7(), "paused")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn test_update_status_on_inactive_records() {
        let (repo, svc) = service(ScriptedRunner::new());
        let def = definition(vec![WorkflowStep::new("a", "sleep")]);

        // A pending record with no coordinator, as left behind by a restart.
        let orphan = WorkflowExecution::new(&def);
        repo.save_execution(&orphan).await.unwrap();
        let update = svc.update_workflow_status(&orphan.id, "cancelled").await.unwrap();
        assert_eq!(update.status, ExecutionStatus::Cancelled);
        let stored = svc.get_execution_detail(&orphan.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
        assert!(stored.completed_at.is_some());

        // Same status again is idempotent; a different one conflicts.
        assert!(svc.update_workflow_status(&orphan.id, "cancelled").await.is_ok());
        let err = svc
            .update_workflow_status(&orphan.id, "completed")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = svc
            .update_workflow_status(&Uuid::now_v7(), "cancelled")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_workflow_executions() {
        let (_repo, svc) = service(ScriptedRunner::new());
        let created = svc
            .create_workflow(request(vec![WorkflowStep::new("a", "sleep")]))
            .await
            .unwrap();
        let first = svc.execute_workflow(&created.id).await.unwrap();
        let second = svc.execute_workflow(&created.id).await.unwrap();
        wait_terminal(&svc, &first.execution_id).await;
        wait_terminal(&svc, &second.execution_id).await;

        let execs = svc.list_workflow_executions(&created.id, 10).await.unwrap();
        assert_eq!(execs.len(), 2);
        assert!(execs.iter().all(|e| e.workflow_id == created.id));

        let err = svc
            .list_workflow_executions(&Uuid::now_v7(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_active_executions() {
        let (_repo, svc) = service(ScriptedRunner::new().delay("long", 10_000));
        let created = svc
            .create_workflow(request(vec![WorkflowStep::new("long", "sleep")]))
            .await
            .unwrap();
        let started = svc.execute_workflow(&created.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(svc.shutdown().await);
        let exec = svc.get_execution_detail(&started.execution_id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert_eq!(exec.steps[0].status, StepStatus::Cancelled);
    }

    async fn shutdown_during_uncooperative_step(runner: ScriptedRunner) -> WorkflowExecution {
        let (_repo, svc) = service(runner.delay("stubborn", 200).ignore_cancel("stubborn"));
        let created = svc
            .create_workflow(request(vec![WorkflowStep::new("stubborn", "sleep")]))
            .await
            .unwrap();
        let started = svc.execute_workflow(&created.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(svc.shutdown().await);
        svc.get_execution_detail(&started.execution_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_cancels_execution_whose_step_fails_late() {
        let exec = shutdown_during_uncooperative_step(ScriptedRunner::new().always_fail("stubborn")).await;
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert_eq!(exec.error.unwrap().code, ExecutionErrorCode::Cancelled);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_execution_whose_step_completes_late() {
        let exec = shutdown_during_uncooperative_step(ScriptedRunner::new()).await;
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert_eq!(exec.error.unwrap().code, ExecutionErrorCode::Cancelled);
    }
}
