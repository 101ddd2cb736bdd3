//! Human-in-the-loop gates
//!
//! A gate suspends a node until a human answers. Three protocols exist:
//!
//! - **clarification**: LLM question in, free-text answer out
//! - **acceptance**: artifact plus instructions in, `ACCEPT` or corrections out
//! - **selection**: empty request, empty acknowledgement ("continue")
//!
//! Each is a [`Gate`] with one outstanding request at a time. Resetting the
//! engine cancels every gate so no stale request can be answered later.

mod error;
mod rendezvous;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub use error::GateError;
pub use rendezvous::{Gate, GateRequest, GateRequests};

/// Which protocol a gate speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Clarification,
    Acceptance,
    Selection,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Clarification => "clarification",
            GateKind::Acceptance => "acceptance",
            GateKind::Selection => "selection",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Question from the LLM in, the human's answer out
pub type ClarificationGate = Gate<String, String>;

/// Artifact with acceptance instructions in, `ACCEPT` or corrections out
pub type AcceptanceGate = Gate<String, String>;

/// Request to continue to the next stage; answered with an acknowledgement
pub type SelectionGate = Gate<(), ()>;

/// The three gates shared by the engine, the nodes and the UI
pub struct Gates {
    pub clarification: ClarificationGate,
    pub acceptance: AcceptanceGate,
    pub selection: SelectionGate,
}

impl Gates {
    pub fn new() -> Self {
        Self {
            clarification: Gate::new(GateKind::Clarification),
            acceptance: Gate::new(GateKind::Acceptance),
            selection: Gate::new(GateKind::Selection),
        }
    }

    /// Abandon every outstanding request
    pub fn cancel_all(&self) {
        debug!("Gates::cancel_all: called");
        self.clarification.cancel_pending();
        self.acceptance.cancel_pending();
        self.selection.cancel_pending();
    }

    /// Kinds of the gates currently waiting for a decision
    pub fn pending(&self) -> Vec<GateKind> {
        [
            (GateKind::Clarification, self.clarification.is_pending()),
            (GateKind::Acceptance, self.acceptance.is_pending()),
            (GateKind::Selection, self.selection.is_pending()),
        ]
        .into_iter()
        .filter_map(|(kind, pending)| pending.then_some(kind))
        .collect()
    }
}

impl Default for Gates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use futures::StreamExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancel_all_releases_every_gate() {
        let gates = Arc::new(Gates::new());
        let mut selections = gates.selection.observe_requests().unwrap();

        let waiter = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move { gates.selection.request_decision((), &CancelToken::new()).await })
        };
        selections.next().await.unwrap();
        assert_eq!(gates.pending(), vec![GateKind::Selection]);

        gates.cancel_all();
        assert_eq!(waiter.await.unwrap(), Err(GateError::Cancelled));
        assert!(gates.pending().is_empty());
    }

    #[test]
    fn test_gate_kind_display() {
        assert_eq!(GateKind::Acceptance.to_string(), "acceptance");
        assert_eq!(serde_json::to_string(&GateKind::Selection).unwrap(), r#""selection""#);
    }
}
