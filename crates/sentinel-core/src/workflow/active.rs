//! Active execution table.
//!
//! Maps execution IDs to the handle needed to observe or stop an in-flight
//! execution: its state tracker and its cancellation token. The table lock
//! only ever guards the map itself; execution state is reached through each
//! tracker's own lock, so unrelated executions never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::checkpoint::ExecutionTracker;
use crate::repository::workflow::WorkflowRepository;

/// Handle to one in-flight execution.
pub struct ActiveExecution<R: WorkflowRepository> {
    pub tracker: Arc<ExecutionTracker<R>>,
    pub cancel: CancellationToken,
}

impl<R: WorkflowRepository> Clone for ActiveExecution<R> {
    fn clone(&self) -> Self {
        Self {
            tracker: Arc::clone(&self.tracker),
            cancel: self.cancel.clone(),
        }
    }
}

/// Process-wide table of in-flight executions.
pub struct ActiveExecutions<R: WorkflowRepository> {
    entries: RwLock<HashMap<Uuid, ActiveExecution<R>>>,
    /// Signalled whenever an entry is removed.
    removed: Notify,
}

impl<R: WorkflowRepository> Default for ActiveExecutions<R> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            removed: Notify::new(),
        }
    }
}

impl<R: WorkflowRepository> ActiveExecutions<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, execution_id: Uuid, handle: ActiveExecution<R>) {
        self.entries.write().await.insert(execution_id, handle);
    }

    pub async fn get(&self, execution_id: &Uuid) -> Option<ActiveExecution<R>> {
        self.entries.read().await.get(execution_id).cloned()
    }

    pub async fn remove(&self, execution_id: &Uuid) -> Option<ActiveExecution<R>> {
        let removed = self.entries.write().await.remove(execution_id);
        self.removed.notify_waiters();
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fire every cancellation token. Returns how many executions were signalled.
    pub async fn cancel_all(&self) -> usize {
        let entries = self.entries.read().await;
        for handle in entries.values() {
            handle.cancel.cancel();
        }
        entries.len()
    }

    /// Wait until the table is empty or `grace` elapses. Returns whether the
    /// table drained in time.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            // Register for the next removal before checking, so a removal
            // between the check and the wait is not missed.
            let notified = self.removed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty().await {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty().await;
            }
        }
    }
}
