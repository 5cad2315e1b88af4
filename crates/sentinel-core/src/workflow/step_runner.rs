//! Step runner abstraction and the built-in tool runner.
//!
//! `StepRunner` is the seam between the engine and whatever actually carries
//! out a step's tool. Runners receive a `CancellationToken` that fires on
//! execution cancellation or when the step's timeout elapses, and must return
//! promptly once it does.
//!
//! `BuiltinToolRunner` simulates the tools the service ships with
//! (`sleep`/`delay`, `validate`/`check`, `fail`, and a generic action) until
//! a real tool integration is wired in.

use std::time::Duration;

use sentinel_types::workflow::WorkflowStep;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default duration of `sleep`/`delay` and of unknown tools.
pub const DEFAULT_ACTION_DURATION: Duration = Duration::from_millis(100);

/// Duration of the `validate`/`check` tools.
pub const VALIDATION_DURATION: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors returned by a step runner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The tool ran and reported failure.
    #[error("step execution failed: {0}")]
    Failed(String),

    /// The step's timeout elapsed before the tool finished.
    #[error("step timed out after {0:?}")]
    TimedOut(Duration),

    /// The cancellation token fired.
    #[error("step cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// StepRunner trait
// ---------------------------------------------------------------------------

/// Executes a single step's tool.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for the async method,
/// consistent with the repository traits.
pub trait StepRunner: Send + Sync {
    /// Run the step's tool, returning its output payload on success.
    fn run(
        &self,
        step: &WorkflowStep,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Result<Value, StepError>> + Send;
}

// ---------------------------------------------------------------------------
// BuiltinToolRunner
// ---------------------------------------------------------------------------

/// Simulated tool execution keyed on `WorkflowStep.tool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinToolRunner;

impl BuiltinToolRunner {
    pub fn new() -> Self {
        Self
    }

    /// How long a tool invocation takes, from the tool name and arguments.
    fn action_duration(step: &WorkflowStep) -> Duration {
        match step.tool.as_str() {
            "sleep" | "delay" => requested_duration(step).unwrap_or(DEFAULT_ACTION_DURATION),
            "validate" | "check" => VALIDATION_DURATION,
            _ => DEFAULT_ACTION_DURATION,
        }
    }
}

impl StepRunner for BuiltinToolRunner {
    async fn run(&self, step: &WorkflowStep, cancel: CancellationToken) -> Result<Value, StepError> {
        if cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        if step.tool == "fail" {
            let message = step
                .arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("tool reported failure");
            return Err(StepError::Failed(message.to_string()));
        }

        let duration = Self::action_duration(step);
        tracing::debug!(
            step_id = step.id.as_str(),
            tool = step.tool.as_str(),
            duration_ms = duration.as_millis() as u64,
            "running built-in tool"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(json!({
                "result": "success",
                "tool": step.tool,
            })),
        }
    }
}

/// Read `duration_ms` (number) or `duration` (`"250ms"`, `"2s"`) from the arguments.
fn requested_duration(step: &WorkflowStep) -> Option<Duration> {
    if let Some(ms) = step.arguments.get("duration_ms").and_then(Value::as_u64) {
        return Some(Duration::from_millis(ms));
    }
    step.arguments
        .get("duration")
        .and_then(Value::as_str)
        .and_then(parse_duration)
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|v| Duration::try_from_secs_f64(v).ok());
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
