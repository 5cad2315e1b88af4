//! Test doubles shared by the engine's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{WorkflowDefinition, WorkflowExecution, WorkflowStep};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::step_runner::{StepError, StepRunner};
use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// MockRepository
// ---------------------------------------------------------------------------

/// In-memory repository that keeps every saved execution version and can be
/// told to start failing execution saves.
#[derive(Default)]
pub(crate) struct MockRepository {
    definitions: Mutex<HashMap<Uuid, WorkflowDefinition>>,
    executions: Mutex<HashMap<Uuid, WorkflowExecution>>,
    history: Mutex<Vec<WorkflowExecution>>,
    /// Execution saves succeed until this many have been made.
    fail_after: Mutex<Option<usize>>,
    /// The single save made once this many have succeeded fails.
    fail_once_at: Mutex<Option<usize>>,
    saves: AtomicUsize,
}

impl MockRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every execution save from now on fails once `n` saves have succeeded.
    pub(crate) fn fail_execution_saves_after(&self, n: usize) {
        *self.fail_after.lock().unwrap() = Some(n);
    }

    /// Only the next execution save after `n` successful ones fails.
    pub(crate) fn fail_one_execution_save_after(&self, n: usize) {
        *self.fail_once_at.lock().unwrap() = Some(n);
    }

    /// All checkpoints written, in order.
    pub(crate) fn history(&self, execution_id: Uuid) -> Vec<WorkflowExecution> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.id == execution_id)
            .cloned()
            .collect()
    }

    pub(crate) fn latest(&self, execution_id: Uuid) -> Option<WorkflowExecution> {
        self.executions.lock().unwrap().get(&execution_id).cloned()
    }
}

impl WorkflowRepository for MockRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions.lock().unwrap().insert(def.id, def.clone());
        Ok(())
    }

    async fn get_definition(&self, id: &Uuid) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.lock().unwrap().get(id).cloned())
    }

    async fn list_definitions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), RepositoryError> {
        let mut defs: Vec<_> = self.definitions.lock().unwrap().values().cloned().collect();
        defs.sort_by(|a, b| b.id.cmp(&a.id));
        let total = defs.len() as u64;
        let page = defs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if self.saves.load(Ordering::SeqCst) >= limit {
                return Err(RepositoryError::Query("disk full".to_string()));
            }
        }
        {
            let mut once = self.fail_once_at.lock().unwrap();
            if *once == Some(self.saves.load(Ordering::SeqCst)) {
                *once = None;
                return Err(RepositoryError::Query("disk full".to_string()));
            }
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().push(execution.clone());
        self.executions
            .lock()
            .unwrap()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut execs: Vec<_> = self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.workflow_id == *workflow_id)
            .cloned()
            .collect();
        execs.sort_by(|a, b| b.id.cmp(&a.id));
        execs.truncate(limit as usize);
        Ok(execs)
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunEvent {
    Started(String),
    Finished(String),
}

/// Step runner whose per-step latency and failures are scripted up front.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    delays: HashMap<String, Duration>,
    /// Number of leading attempts that fail; `u32::MAX` fails forever.
    failures: HashMap<String, u32>,
    /// Steps that keep running after cancellation until their delay elapses.
    stubborn: HashSet<String>,
    attempts: Mutex<HashMap<String, u32>>,
    events: Mutex<Vec<RunEvent>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn delay(mut self, step_id: &str, ms: u64) -> Self {
        self.delays.insert(step_id.to_string(), Duration::from_millis(ms));
        self
    }

    pub(crate) fn fail_times(mut self, step_id: &str, times: u32) -> Self {
        self.failures.insert(step_id.to_string(), times);
        self
    }

    pub(crate) fn always_fail(self, step_id: &str) -> Self {
        self.fail_times(step_id, u32::MAX)
    }

    pub(crate) fn ignore_cancel(mut self, step_id: &str) -> Self {
        self.stubborn.insert(step_id.to_string());
        self
    }

    pub(crate) fn attempts(&self, step_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(step_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Highest number of steps observed running at once.
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl StepRunner for ScriptedRunner {
    async fn run(&self, step: &WorkflowStep, cancel: CancellationToken) -> Result<Value, StepError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(step.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.events
            .lock()
            .unwrap()
            .push(RunEvent::Started(step.id.clone()));
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&step.id)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        let cancelled = if self.stubborn.contains(&step.id) {
            tokio::time::sleep(delay).await;
            false
        } else {
            tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(RunEvent::Finished(step.id.clone()));

        if cancelled {
            return Err(StepError::Cancelled);
        }
        let failures = self.failures.get(&step.id).copied().unwrap_or(0);
        if attempt <= failures {
            return Err(StepError::Failed(format!("scripted failure #{attempt}")));
        }
        Ok(json!({ "step": step.id, "attempt": attempt }))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn definition(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
    let now = chrono::Utc::now();
    WorkflowDefinition {
        id: Uuid::now_v7(),
        name: "test-workflow".to_string(),
        description: None,
        version: "1.0.0".to_string(),
        steps,
        input_schema: None,
        output_schema: None,
        created_at: now,
        updated_at: now,
    }
}
