//! Event Bus - pub/sub for workflow run events
//!
//! The EventBus uses tokio broadcast channels to deliver events to all
//! subscribers. The engine and the nodes emit; the JSONL logger and the
//! terminal front end subscribe.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{FlowEvent, summarize};
use crate::gate::GateKind;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4_096;

/// Longest free-text excerpt carried in summary fields
const SUMMARY_CHARS: usize = 200;

/// Central event bus for workflow activity
pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: FlowEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        let run_id = run_id.into();
        debug!(%run_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            run_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting events of one run without owning the bus
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<FlowEvent>,
    run_id: String,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").field("run_id", &self.run_id).finish()
    }
}

impl EventEmitter {
    /// Get the run ID this emitter is bound to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: FlowEvent) {
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn run_started(&self, start_stage: &str, end_stage: &str, input: &str) {
        self.emit(FlowEvent::RunStarted {
            run_id: self.run_id.clone(),
            start_stage: start_stage.to_string(),
            end_stage: end_stage.to_string(),
            input_summary: summarize(input, SUMMARY_CHARS),
        });
    }

    pub fn run_completed(&self, success: bool, visits: usize) {
        self.emit(FlowEvent::RunCompleted {
            run_id: self.run_id.clone(),
            success,
            visits,
        });
    }

    pub fn run_cancelled(&self) {
        self.emit(FlowEvent::RunCancelled {
            run_id: self.run_id.clone(),
        });
    }

    pub fn node_visited(&self, node_id: &str, occurrence: usize, name: &str) {
        self.emit(FlowEvent::NodeVisited {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            occurrence,
            name: name.to_string(),
        });
    }

    pub fn llm_call_started(
        &self,
        node_id: &str,
        occurrence: usize,
        system_messages: Vec<String>,
        user_messages: Vec<String>,
    ) {
        self.emit(FlowEvent::LlmCallStarted {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            occurrence,
            system_messages,
            user_messages,
        });
    }

    pub fn llm_call_completed(&self, node_id: &str, occurrence: usize, response: &str) {
        self.emit(FlowEvent::LlmCallCompleted {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            occurrence,
            response: response.to_string(),
        });
    }

    pub fn llm_call_failed(&self, node_id: &str, occurrence: usize, error: &str) {
        self.emit(FlowEvent::LlmCallFailed {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            occurrence,
            error: error.to_string(),
        });
    }

    pub fn gate_requested(&self, gate: GateKind, payload: &str) {
        self.emit(FlowEvent::GateRequested {
            run_id: self.run_id.clone(),
            gate,
            payload_summary: summarize(payload, SUMMARY_CHARS),
        });
    }

    pub fn gate_resolved(&self, gate: GateKind, decision: &str) {
        self.emit(FlowEvent::GateResolved {
            run_id: self.run_id.clone(),
            gate,
            decision_summary: summarize(decision, SUMMARY_CHARS),
        });
    }

    pub fn error(&self, context: &str, message: &str) {
        self.emit(FlowEvent::Error {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }

    pub fn warning(&self, context: &str, message: &str) {
        self.emit(FlowEvent::Warning {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(16);
        // no subscriber: must not panic
        bus.emitter_for("run").run_cancelled();
    }

    #[tokio::test]
    async fn test_event_emitter_convenience_methods() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-789");

        emitter.run_started("ucd", "adm", "A library lends books");
        emitter.node_visited("ucd.change_prompt", 0, "Change Prompt");
        emitter.llm_call_started("ucd.generation", 0, vec!["sys".to_string()], vec!["user".to_string()]);
        emitter.llm_call_completed("ucd.generation", 0, "@startuml");
        emitter.gate_requested(GateKind::Acceptance, "@startuml");
        emitter.gate_resolved(GateKind::Acceptance, "ACCEPT");
        emitter.run_completed(true, 4);

        for _ in 0..7 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.run_id(), "run-789");
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emitter_for("run").warning("render", "slow server");

        assert_eq!(rx1.recv().await.unwrap().event_type(), "Warning");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "Warning");
    }
}
