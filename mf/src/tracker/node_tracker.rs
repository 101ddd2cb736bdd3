//! Live execution tracker with epoch-guarded writers

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

use super::{LlmCallRecorder, VisitId, WorkflowExecution};
use crate::events::EventEmitter;

/// Observable log of the current run
///
/// Observers get immutable snapshots through [`ExecutionTracker::subscribe`].
/// Only [`TrackerHandle`]s write; a reset bumps the epoch so writes from a
/// handle created before the reset are dropped.
pub struct ExecutionTracker {
    tx: watch::Sender<Arc<WorkflowExecution>>,
    epoch: AtomicU64,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(WorkflowExecution::default()));
        Self {
            tx,
            epoch: AtomicU64::new(0),
        }
    }

    /// Receive a new snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<WorkflowExecution>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<WorkflowExecution> {
        Arc::clone(&self.tx.borrow())
    }

    /// Clear the log and invalidate every existing handle
    pub fn reset(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch, "ExecutionTracker::reset: called");
        self.tx.send_replace(Arc::new(WorkflowExecution::default()));
    }

    /// Writer for one run, bound to the current epoch
    pub fn handle(self: &Arc<Self>, events: Option<EventEmitter>) -> TrackerHandle {
        TrackerHandle {
            tracker: Arc::clone(self),
            epoch: self.epoch.load(Ordering::SeqCst),
            events,
        }
    }

    /// Apply `f` unless `epoch` is stale; returns `None` when dropped
    fn modify<R>(&self, epoch: u64, f: impl FnOnce(&mut WorkflowExecution) -> R) -> Option<R> {
        let mut result = None;
        self.tx.send_if_modified(|execution| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            result = Some(f(Arc::make_mut(execution)));
            true
        });
        if result.is_none() {
            debug!(epoch, "ExecutionTracker::modify: stale writer ignored");
        }
        result
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Write access to the tracker for a single run
#[derive(Clone)]
pub struct TrackerHandle {
    tracker: Arc<ExecutionTracker>,
    epoch: u64,
    events: Option<EventEmitter>,
}

impl TrackerHandle {
    /// Record entering a node; `None` when this handle is stale
    pub fn track_node_visit(&self, node_id: &str, name: &str) -> Option<VisitId> {
        let id = self
            .tracker
            .modify(self.epoch, |execution| execution.add_visit(node_id, name, Utc::now()))?;
        debug!(visit = %id, "track_node_visit: recorded");
        if let Some(events) = &self.events {
            events.node_visited(&id.node_id, id.occurrence, name);
        }
        Some(id)
    }

    pub fn snapshot(&self) -> Arc<WorkflowExecution> {
        self.tracker.snapshot()
    }

    /// How many times `node_id` has been visited in this run
    pub fn occurrences(&self, node_id: &str) -> usize {
        self.tracker.snapshot().occurrences(node_id)
    }

    /// False once the tracker was reset after this handle was made
    pub fn is_current(&self) -> bool {
        self.tracker.epoch.load(Ordering::SeqCst) == self.epoch
    }
}

impl LlmCallRecorder for TrackerHandle {
    fn call_starting(&self, system_messages: Vec<String>, user_messages: Vec<String>) {
        let recorded = self.tracker.modify(self.epoch, |execution| {
            execution.start_llm_call(system_messages.clone(), user_messages.clone(), Utc::now())
        });
        if let (Some(Some(visit)), Some(events)) = (recorded, &self.events) {
            events.llm_call_started(&visit.node_id, visit.occurrence, system_messages, user_messages);
        }
    }

    fn call_completed(&self, response: String) {
        let recorded = self
            .tracker
            .modify(self.epoch, |execution| execution.complete_llm_call(response.clone(), Utc::now()));
        if let (Some(Some(visit)), Some(events)) = (recorded, &self.events) {
            events.llm_call_completed(&visit.node_id, visit.occurrence, &response);
        }
    }

    fn call_failed(&self, error: String) {
        let recorded = self
            .tracker
            .modify(self.epoch, |execution| execution.fail_llm_call(error.clone(), Utc::now()));
        if let (Some(Some(visit)), Some(events)) = (recorded, &self.events) {
            events.llm_call_failed(&visit.node_id, visit.occurrence, &error);
        }
    }
}
