//! Event types for workflow activity streaming
//!
//! These events represent all observable activity of a workflow run:
//! - Run lifecycle (start, complete)
//! - Node visits and the transitions between them
//! - LLM calls made while a node is active
//! - Human-in-the-loop gate requests and decisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::GateKind;

/// Core event enum - the vocabulary of workflow activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    // === Run Lifecycle ===
    /// A run has started
    RunStarted {
        run_id: String,
        start_stage: String,
        end_stage: String,
        input_summary: String,
    },
    /// A run has ended
    RunCompleted {
        run_id: String,
        success: bool,
        visits: usize,
    },
    /// A run was cancelled by reset
    RunCancelled { run_id: String },

    // === Node Activity ===
    /// A tracked node has been entered
    NodeVisited {
        run_id: String,
        node_id: String,
        occurrence: usize,
        name: String,
    },

    // === LLM Calls ===
    /// An LLM call is about to be sent from the current node
    LlmCallStarted {
        run_id: String,
        node_id: String,
        occurrence: usize,
        system_messages: Vec<String>,
        user_messages: Vec<String>,
    },
    /// The LLM call of the current node returned
    LlmCallCompleted {
        run_id: String,
        node_id: String,
        occurrence: usize,
        response: String,
    },
    /// The LLM call of the current node failed
    LlmCallFailed {
        run_id: String,
        node_id: String,
        occurrence: usize,
        error: String,
    },

    // === Gates ===
    /// A node is waiting for a human decision
    GateRequested {
        run_id: String,
        gate: GateKind,
        payload_summary: String,
    },
    /// The human decision arrived
    GateResolved {
        run_id: String,
        gate: GateKind,
        decision_summary: String,
    },

    // === Diagnostics ===
    Error {
        run_id: String,
        context: String,
        message: String,
    },
    Warning {
        run_id: String,
        context: String,
        message: String,
    },
}

impl FlowEvent {
    /// Get the run ID for this event
    pub fn run_id(&self) -> &str {
        match self {
            FlowEvent::RunStarted { run_id, .. }
            | FlowEvent::RunCompleted { run_id, .. }
            | FlowEvent::RunCancelled { run_id }
            | FlowEvent::NodeVisited { run_id, .. }
            | FlowEvent::LlmCallStarted { run_id, .. }
            | FlowEvent::LlmCallCompleted { run_id, .. }
            | FlowEvent::LlmCallFailed { run_id, .. }
            | FlowEvent::GateRequested { run_id, .. }
            | FlowEvent::GateResolved { run_id, .. }
            | FlowEvent::Error { run_id, .. }
            | FlowEvent::Warning { run_id, .. } => run_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            FlowEvent::RunStarted { .. } => "RunStarted",
            FlowEvent::RunCompleted { .. } => "RunCompleted",
            FlowEvent::RunCancelled { .. } => "RunCancelled",
            FlowEvent::NodeVisited { .. } => "NodeVisited",
            FlowEvent::LlmCallStarted { .. } => "LlmCallStarted",
            FlowEvent::LlmCallCompleted { .. } => "LlmCallCompleted",
            FlowEvent::LlmCallFailed { .. } => "LlmCallFailed",
            FlowEvent::GateRequested { .. } => "GateRequested",
            FlowEvent::GateResolved { .. } => "GateResolved",
            FlowEvent::Error { .. } => "Error",
            FlowEvent::Warning { .. } => "Warning",
        }
    }

    /// True for the events that end a run's log
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowEvent::RunCompleted { .. } | FlowEvent::RunCancelled { .. })
    }
}

/// Shorten free text for event summaries
pub fn summarize(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: FlowEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: FlowEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_run_id_and_type() {
        let event = FlowEvent::NodeVisited {
            run_id: "run-1".to_string(),
            node_id: "ucd.generation".to_string(),
            occurrence: 0,
            name: "Generate Use Case Diagram".to_string(),
        };
        assert_eq!(event.run_id(), "run-1");
        assert_eq!(event.event_type(), "NodeVisited");
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = FlowEvent::GateRequested {
            run_id: "run-1".to_string(),
            gate: GateKind::Acceptance,
            payload_summary: "@startuml".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"GateRequested""#));
        assert!(json.contains(r#""gate":"acceptance""#));

        let parsed: FlowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_log_entry_uses_ts_key() {
        let entry = EventLogEntry::new(FlowEvent::RunCancelled {
            run_id: "run-2".to_string(),
        });
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""ts":"#));
        assert!(entry.event.is_terminal());
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("  short  ", 10), "short");
        assert_eq!(summarize("abcdefghij", 4), "abcd...");
    }
}
