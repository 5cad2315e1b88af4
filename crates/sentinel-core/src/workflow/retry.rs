//! Retry controller: bounded step retries with linear backoff.
//!
//! A step with retry budget `r` gets at most `r + 1` attempts. After failed
//! attempt `k` the controller waits `k * backoff_unit` before trying again.
//! Each attempt is optionally bounded by a timeout; a timed-out attempt is
//! retried like any other failure. Cancellation is checked before every
//! attempt and interrupts the backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use sentinel_types::workflow::WorkflowStep;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::checkpoint::{CheckpointError, ExecutionTracker};
use super::step_runner::{StepError, StepRunner};
use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Retry budget and backoff for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first failure.
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn for_step(step: &WorkflowStep, backoff_unit: Duration) -> Self {
        Self {
            max_retries: step.retry_count,
            backoff_unit,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt follows failed attempt `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

// ---------------------------------------------------------------------------
// StepVerdict
// ---------------------------------------------------------------------------

/// Terminal outcome of a step after all its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Succeeded,
    /// Retry budget exhausted; carries the last attempt's error.
    Failed { error: String },
    Cancelled,
}

// ---------------------------------------------------------------------------
// RetryController
// ---------------------------------------------------------------------------

/// Wraps a `StepRunner` with retries, timeouts and cancellation, recording
/// every attempt through the execution tracker.
pub struct RetryController<S: StepRunner> {
    runner: Arc<S>,
    backoff_unit: Duration,
    default_timeout: Option<Duration>,
}

impl<S: StepRunner> Clone for RetryController<S> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            backoff_unit: self.backoff_unit,
            default_timeout: self.default_timeout,
        }
    }
}

impl<S: StepRunner> RetryController<S> {
    pub fn new(runner: Arc<S>, backoff_unit: Duration, default_timeout: Option<Duration>) -> Self {
        Self {
            runner,
            backoff_unit,
            default_timeout,
        }
    }

    /// Per-attempt timeout: the step's own, else the engine default.
    fn timeout_for(&self, step: &WorkflowStep) -> Option<Duration> {
        step.timeout_ms
            .map(Duration::from_millis)
            .or(self.default_timeout)
    }

    /// Run `step` (at `index` in the definition) until it succeeds, exhausts
    /// its retries, or `cancel` fires.
    ///
    /// Only checkpoint failures are returned as errors; step failures are
    /// part of the verdict.
    pub async fn run_step<R: WorkflowRepository>(
        &self,
        tracker: &ExecutionTracker<R>,
        index: usize,
        step: &WorkflowStep,
        cancel: &CancellationToken,
    ) -> Result<StepVerdict, CheckpointError> {
        let policy = RetryPolicy::for_step(step, self.backoff_unit);
        let timeout = self.timeout_for(step);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                tracker.step_cancelled(index).await?;
                return Ok(StepVerdict::Cancelled);
            }

            tracker.step_attempt_started(index, attempt).await?;
            tracing::debug!(step_id = step.id.as_str(), attempt, "step attempt started");

            let error = match self.attempt(step, cancel, timeout).await {
                Ok(output) => {
                    tracker.step_completed(index, output).await?;
                    tracing::info!(step_id = step.id.as_str(), attempt, "step completed");
                    return Ok(StepVerdict::Succeeded);
                }
                Err(StepError::Cancelled) if cancel.is_cancelled() => {
                    tracker.step_cancelled(index).await?;
                    tracing::info!(step_id = step.id.as_str(), attempt, "step cancelled");
                    return Ok(StepVerdict::Cancelled);
                }
                Err(e) => e.to_string(),
            };

            if !policy.should_retry(attempt) {
                tracker.step_failed(index, &error).await?;
                tracing::warn!(
                    step_id = step.id.as_str(),
                    attempts = attempt,
                    error = error.as_str(),
                    "step failed, retry budget exhausted"
                );
                return Ok(StepVerdict::Failed { error });
            }

            tracker.step_attempt_failed(index, &error).await?;
            let delay = policy.backoff(attempt);
            tracing::warn!(
                step_id = step.id.as_str(),
                attempt,
                max_attempts = policy.max_attempts(),
                backoff_ms = delay.as_millis() as u64,
                error = error.as_str(),
                "step attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracker.step_cancelled(index).await?;
                    return Ok(StepVerdict::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt, bounded by `timeout` when set.
    async fn attempt(
        &self,
        step: &WorkflowStep,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Value, StepError> {
        let token = cancel.child_token();
        let run = self.runner.run(step, token.clone());

        let Some(limit) = timeout else {
            return run.await;
        };
        match tokio::time::timeout(limit, run).await {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                Err(StepError::TimedOut(limit))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
