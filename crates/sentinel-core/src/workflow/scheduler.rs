//! Event-driven dependency scheduler.
//!
//! Keeps a `JoinSet` of in-flight steps and recomputes the ready set each time
//! one of them finishes, so a step starts as soon as its last dependency
//! completes rather than when its whole "wave" does. Concurrency is capped by
//! a per-execution semaphore; permits are taken inside the spawned task, so a
//! step only turns `Running` once it holds one.
//!
//! Fail-fast: after the first terminal step failure nothing new is
//! dispatched, but steps already in flight are allowed to finish.

use std::collections::HashSet;
use std::sync::Arc;

use sentinel_types::workflow::WorkflowStep;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::checkpoint::{CheckpointError, ExecutionTracker};
use super::dag;
use super::retry::{RetryController, StepVerdict};
use super::step_runner::StepRunner;
use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// How a scheduler run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step completed.
    Completed,
    /// The cancellation token fired before the run could finish.
    Cancelled,
    /// A step exhausted its retries.
    StepFailed { step_id: String, error: String },
    /// Nothing is running and no remaining step can ever become ready.
    Stuck { message: String },
}

type StepTaskResult = (usize, Result<StepVerdict, CheckpointError>);

// ---------------------------------------------------------------------------
// DependencyScheduler
// ---------------------------------------------------------------------------

/// Drives one execution's steps to completion in dependency order.
pub struct DependencyScheduler<R: WorkflowRepository, S: StepRunner> {
    steps: Arc<[WorkflowStep]>,
    tracker: Arc<ExecutionTracker<R>>,
    retry: RetryController<S>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<R, S> DependencyScheduler<R, S>
where
    R: WorkflowRepository + 'static,
    S: StepRunner + 'static,
{
    pub fn new(
        steps: Arc<[WorkflowStep]>,
        tracker: Arc<ExecutionTracker<R>>,
        retry: RetryController<S>,
        max_parallel_steps: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            steps,
            tracker,
            retry,
            permits: Arc::new(Semaphore::new(max_parallel_steps.max(1))),
            cancel,
        }
    }

    /// Run until all steps complete, a step fails, the run gets stuck, or the
    /// execution is cancelled. Always waits for in-flight steps to settle
    /// before returning.
    ///
    /// Returns `Err` only when a checkpoint could not be persisted; in that
    /// case the remaining in-flight steps are interrupted.
    pub async fn run(&self) -> Result<RunOutcome, CheckpointError> {
        // Steps run under a child token so a checkpoint failure can stop them
        // without marking the execution itself as cancelled.
        let abort = self.cancel.child_token();

        let mut completed: HashSet<String> = HashSet::new();
        let mut in_flight: HashSet<usize> = HashSet::new();
        let mut tasks: JoinSet<StepTaskResult> = JoinSet::new();
        let mut failure: Option<(String, String)> = None;
        let mut fatal: Option<CheckpointError> = None;

        loop {
            if failure.is_none() && fatal.is_none() && !abort.is_cancelled() {
                for index in dag::ready_steps(&self.steps, &completed, &in_flight) {
                    in_flight.insert(index);
                    self.spawn_step(&mut tasks, index, abort.clone());
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((index, Ok(verdict))) => {
                    in_flight.remove(&index);
                    let step_id = &self.steps[index].id;
                    match verdict {
                        StepVerdict::Succeeded => {
                            completed.insert(step_id.clone());
                        }
                        StepVerdict::Failed { error } => {
                            if failure.is_none() {
                                tracing::warn!(
                                    step_id = step_id.as_str(),
                                    in_flight = in_flight.len(),
                                    "step failed, no further steps will be dispatched"
                                );
                                failure = Some((step_id.clone(), error));
                            }
                        }
                        StepVerdict::Cancelled => {}
                    }
                }
                Ok((index, Err(e))) => {
                    in_flight.remove(&index);
                    tracing::error!(
                        step_id = self.steps[index].id.as_str(),
                        error = %e,
                        "checkpoint failed, aborting in-flight steps"
                    );
                    abort.cancel();
                    fatal.get_or_insert(e);
                }
                Err(join_err) => {
                    // The index of a panicked task is not recoverable.
                    tracing::error!(error = %join_err, "step task panicked");
                    failure.get_or_insert_with(|| {
                        (String::from("unknown"), format!("step task panicked: {join_err}"))
                    });
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }
        // A cancel request wins over whatever in-flight steps reported after it.
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        if let Some((step_id, error)) = failure {
            return Ok(RunOutcome::StepFailed { step_id, error });
        }
        if completed.len() == self.steps.len() {
            return Ok(RunOutcome::Completed);
        }
        Ok(RunOutcome::Stuck {
            message: dag::describe_stuck(&self.steps, &completed),
        })
    }

    fn spawn_step(
        &self,
        tasks: &mut JoinSet<StepTaskResult>,
        index: usize,
        cancel: CancellationToken,
    ) {
        let steps = Arc::clone(&self.steps);
        let tracker = Arc::clone(&self.tracker);
        let retry = self.retry.clone();
        let permits = Arc::clone(&self.permits);

        tasks.spawn(async move {
            let step = &steps[index];
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return (index, Ok(StepVerdict::Cancelled)),
                },
                _ = cancel.cancelled() => {
                    let result = tracker.step_cancelled(index).await.map(|_| StepVerdict::Cancelled);
                    return (index, result);
                }
            };
            let result = retry.run_step(&tracker, index, step, &cancel).await;
            (index, result)
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
