//! Execution coordinator: drives one execution from `Pending` to a terminal
//! status.
//!
//! The coordinator marks the execution `Running`, runs the dependency
//! scheduler, maps its outcome to `Completed`/`Failed`/`Cancelled`, writes the
//! final checkpoint and removes the execution from the active table. It runs
//! inside a `workflow_execution` tracing span.

use std::sync::Arc;

use sentinel_types::workflow::{
    ExecutionError, ExecutionErrorCode, ExecutionStatus, WorkflowStep,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::active::ActiveExecutions;
use super::checkpoint::{CheckpointError, ExecutionTracker};
use super::retry::RetryController;
use super::scheduler::{DependencyScheduler, RunOutcome};
use super::step_runner::StepRunner;
use crate::repository::workflow::WorkflowRepository;

pub struct ExecutionCoordinator<R: WorkflowRepository, S: StepRunner> {
    workflow_id: Uuid,
    tracker: Arc<ExecutionTracker<R>>,
    scheduler: DependencyScheduler<R, S>,
    active: Arc<ActiveExecutions<R>>,
    cancel: CancellationToken,
}

impl<R, S> ExecutionCoordinator<R, S>
where
    R: WorkflowRepository + 'static,
    S: StepRunner + 'static,
{
    pub fn new(
        workflow_id: Uuid,
        steps: Arc<[WorkflowStep]>,
        tracker: Arc<ExecutionTracker<R>>,
        retry: RetryController<S>,
        max_parallel_steps: usize,
        active: Arc<ActiveExecutions<R>>,
        cancel: CancellationToken,
    ) -> Self {
        let scheduler = DependencyScheduler::new(
            steps,
            Arc::clone(&tracker),
            retry,
            max_parallel_steps,
            cancel.clone(),
        );
        Self {
            workflow_id,
            tracker,
            scheduler,
            active,
            cancel,
        }
    }

    /// Run the execution to completion and return its final recorded status.
    pub async fn run(self) -> ExecutionStatus {
        let span = tracing::info_span!(
            "workflow_execution",
            execution_id = %self.tracker.execution_id(),
            workflow_id = %self.workflow_id,
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> ExecutionStatus {
        let execution_id = self.tracker.execution_id();
        tracing::info!("workflow execution started");

        let (status, error) = terminal_state(self.drive().await);

        match self.tracker.finalize(status, error.clone()).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("execution already terminal, final state kept"),
            Err(e) => tracing::error!(error = %e, "failed to persist final execution state"),
        }
        self.active.remove(&execution_id).await;

        let recorded = self.tracker.status().await;
        match &error {
            Some(err) if recorded == status => tracing::warn!(
                status = %recorded,
                code = ?err.code,
                step_id = err.step_id.as_deref(),
                message = err.message.as_str(),
                "workflow execution finished"
            ),
            _ => tracing::info!(status = %recorded, "workflow execution finished"),
        }
        recorded
    }

    async fn drive(&self) -> Result<RunOutcome, CheckpointError> {
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        self.tracker.mark_running().await?;
        self.scheduler.run().await
    }
}

/// Map a scheduler result to the terminal status and error to record.
fn terminal_state(
    result: Result<RunOutcome, CheckpointError>,
) -> (ExecutionStatus, Option<ExecutionError>) {
    match result {
        Ok(RunOutcome::Completed) => (ExecutionStatus::Completed, None),
        Ok(RunOutcome::Cancelled) => (
            ExecutionStatus::Cancelled,
            Some(ExecutionError {
                code: ExecutionErrorCode::Cancelled,
                message: "workflow execution cancelled".to_string(),
                step_id: None,
            }),
        ),
        Ok(RunOutcome::StepFailed { step_id, error }) => (
            ExecutionStatus::Failed,
            Some(ExecutionError {
                code: ExecutionErrorCode::ExecutionFailed,
                message: format!("step '{step_id}' failed: {error}"),
                step_id: Some(step_id),
            }),
        ),
        Ok(RunOutcome::Stuck { message }) => (
            ExecutionStatus::Failed,
            Some(ExecutionError {
                code: ExecutionErrorCode::WorkflowStuck,
                message,
                step_id: None,
            }),
        ),
        Err(e) => (
            ExecutionStatus::Failed,
            Some(ExecutionError {
                code: ExecutionErrorCode::CheckpointFailed,
                message: e.to_string(),
                step_id: None,
            }),
        ),
    }
}
