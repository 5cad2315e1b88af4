//! Execution state tracker with checkpoint-per-transition persistence.
//!
//! `ExecutionTracker` owns one `WorkflowExecution` behind its own lock. Every
//! transition is applied to a copy under that lock and saved through the
//! repository before the lock is released, so checkpoints land in transition
//! order and readers never see a half-applied update. The copy replaces the
//! in-memory state only once the save succeeds; a failed save leaves memory
//! matching the last persisted checkpoint.
//!
//! Once the execution reaches a terminal status the record is read-only:
//! later transitions are ignored and report `Ok(false)`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{
    ExecutionError, ExecutionStatus, StepAttempt, StepResult, StepStatus, WorkflowExecution,
};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// CheckpointError
// ---------------------------------------------------------------------------

/// Errors from checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint failed: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// ExecutionTracker
// ---------------------------------------------------------------------------

/// Sole writer of one execution's mutable state.
///
/// Generic over `R: WorkflowRepository` so it works with any storage backend
/// (SQLite, in-memory, test mock).
pub struct ExecutionTracker<R: WorkflowRepository> {
    repo: Arc<R>,
    execution_id: Uuid,
    state: Mutex<WorkflowExecution>,
}

impl<R: WorkflowRepository> ExecutionTracker<R> {
    pub fn new(repo: Arc<R>, execution: WorkflowExecution) -> Self {
        Self {
            repo,
            execution_id: execution.id,
            state: Mutex::new(execution),
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Consistent copy of the current in-memory state.
    pub async fn snapshot(&self) -> WorkflowExecution {
        self.state.lock().await.clone()
    }

    pub async fn status(&self) -> ExecutionStatus {
        self.state.lock().await.status
    }

    /// Apply `update` and persist, unless the execution is already terminal.
    async fn transition<F>(&self, event: &'static str, update: F) -> Result<bool, CheckpointError>
    where
        F: FnOnce(&mut WorkflowExecution),
    {
        let mut state = self.state.lock().await;
        if state.status.is_terminal() {
            tracing::debug!(
                execution_id = %self.execution_id,
                status = %state.status,
                event,
                "ignoring transition on terminal execution"
            );
            return Ok(false);
        }

        let mut next = state.clone();
        update(&mut next);
        self.repo.save_execution(&next).await?;
        *state = next;

        tracing::debug!(
            execution_id = %self.execution_id,
            event,
            progress = state.progress,
            "checkpointed execution"
        );
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Execution-level transitions
    // -----------------------------------------------------------------------

    /// Pending -> Running.
    pub async fn mark_running(&self) -> Result<bool, CheckpointError> {
        self.transition("execution_running", |exec| {
            exec.status = ExecutionStatus::Running;
            exec.started_at.get_or_insert_with(Utc::now);
        })
        .await
    }

    /// Move to a terminal status. `Completed` forces progress to 100.
    pub async fn finalize(
        &self,
        status: ExecutionStatus,
        error: Option<ExecutionError>,
    ) -> Result<bool, CheckpointError> {
        self.transition("execution_finalized", |exec| {
            exec.status = status;
            exec.completed_at = Some(Utc::now());
            exec.error = error;
            if status == ExecutionStatus::Completed {
                exec.progress = 100;
            }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Step-level transitions
    // -----------------------------------------------------------------------

    /// A step attempt is starting (`attempt` is 1-based).
    pub async fn step_attempt_started(
        &self,
        index: usize,
        attempt: u32,
    ) -> Result<bool, CheckpointError> {
        self.transition("step_attempt_started", |exec| {
            let now = Utc::now();
            let result = &mut exec.steps[index];
            result.status = StepStatus::Running;
            result.started_at.get_or_insert(now);
            result.retry_count = attempt.saturating_sub(1);
            result.attempts.push(StepAttempt {
                attempt,
                started_at: now,
                completed_at: None,
                success: false,
                duration_ms: None,
                error: None,
            });
        })
        .await
    }

    /// A non-final attempt failed; the step stays `Running` while it retries.
    pub async fn step_attempt_failed(
        &self,
        index: usize,
        error: &str,
    ) -> Result<bool, CheckpointError> {
        self.transition("step_attempt_failed", |exec| {
            let result = &mut exec.steps[index];
            close_attempt(result, Utc::now(), false, Some(error));
            result.error = Some(error.to_string());
        })
        .await
    }

    /// The step succeeded. Progress never decreases and stays below 100
    /// until the execution itself completes.
    pub async fn step_completed(&self, index: usize, output: Value) -> Result<bool, CheckpointError> {
        self.transition("step_completed", |exec| {
            let now = Utc::now();
            let result = &mut exec.steps[index];
            close_attempt(result, now, true, None);
            result.status = StepStatus::Completed;
            result.output = Some(output);
            result.error = None;
            finish_step(result, now);

            let computed = exec.computed_progress().min(99);
            exec.progress = exec.progress.max(computed);
        })
        .await
    }

    /// The step exhausted its retry budget.
    pub async fn step_failed(&self, index: usize, error: &str) -> Result<bool, CheckpointError> {
        self.transition("step_failed", |exec| {
            let now = Utc::now();
            let result = &mut exec.steps[index];
            close_attempt(result, now, false, Some(error));
            result.status = StepStatus::Failed;
            result.error = Some(error.to_string());
            finish_step(result, now);
        })
        .await
    }

    /// The step was interrupted by cancellation.
    pub async fn step_cancelled(&self, index: usize) -> Result<bool, CheckpointError> {
        self.transition("step_cancelled", |exec| {
            let now = Utc::now();
            let result = &mut exec.steps[index];
            close_attempt(result, now, false, Some("cancelled"));
            result.status = StepStatus::Cancelled;
            finish_step(result, now);
        })
        .await
    }
}

/// Close the most recent attempt if it is still open.
fn close_attempt(result: &mut StepResult, now: DateTime<Utc>, success: bool, error: Option<&str>) {
    if let Some(attempt) = result.attempts.last_mut() {
        if attempt.completed_at.is_none() {
            attempt.completed_at = Some(now);
            attempt.success = success;
            attempt.duration_ms = Some(elapsed_ms(attempt.started_at, now));
            attempt.error = error.map(str::to_string);
        }
    }
}

fn finish_step(result: &mut StepResult, now: DateTime<Utc>) {
    result.completed_at = Some(now);
    result.duration_ms = result.started_at.map(|started| elapsed_ms(started, now));
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
