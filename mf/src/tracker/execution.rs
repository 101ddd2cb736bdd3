//! Execution log data: node visits, transitions and LLM call records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::events::{EventLogEntry, FlowEvent};

/// Identity of one visit: the node and how many times it was entered before
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitId {
    pub node_id: String,
    /// Zero-based occurrence index of `node_id` within the run
    pub occurrence: usize,
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node_id, self.occurrence)
    }
}

/// One LLM request/response pair made during a visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub system_messages: Vec<String>,
    pub user_messages: Vec<String>,
    /// `None` while the call is in flight
    pub response: Option<String>,
    /// Set when the call failed
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LlmCallRecord {
    /// Neither a response nor an error has arrived yet
    pub fn is_open(&self) -> bool {
        self.response.is_none() && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNodeVisit {
    pub id: VisitId,
    pub name: String,
    pub visited_at: DateTime<Utc>,
    pub llm_calls: Vec<LlmCallRecord>,
}

/// Transition between two consecutive visits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdgeVisit {
    pub from: VisitId,
    pub to: VisitId,
    pub traversed_at: DateTime<Utc>,
}

/// Ordered log of what a run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    nodes: Vec<WorkflowNodeVisit>,
    edges: Vec<WorkflowEdgeVisit>,
}

impl WorkflowExecution {
    pub fn nodes(&self) -> &[WorkflowNodeVisit] {
        &self.nodes
    }

    pub fn edges(&self) -> &[WorkflowEdgeVisit] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn last_visit(&self) -> Option<&WorkflowNodeVisit> {
        self.nodes.last()
    }

    pub fn visit(&self, id: &VisitId) -> Option<&WorkflowNodeVisit> {
        self.nodes.iter().find(|v| &v.id == id)
    }

    /// Visits of one node in order
    pub fn visits_of<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a WorkflowNodeVisit> + 'a {
        self.nodes.iter().filter(move |v| v.id.node_id == node_id)
    }

    /// How many times `node_id` has been entered
    pub fn occurrences(&self, node_id: &str) -> usize {
        self.visits_of(node_id).count()
    }

    /// Node ids in visit order
    pub fn path(&self) -> Vec<&str> {
        self.nodes.iter().map(|v| v.id.node_id.as_str()).collect()
    }

    /// Record entering `node_id`, linking it to the previous visit
    pub(crate) fn add_visit(&mut self, node_id: &str, name: &str, at: DateTime<Utc>) -> VisitId {
        let id = VisitId {
            node_id: node_id.to_string(),
            occurrence: self.occurrences(node_id),
        };
        if let Some(previous) = self.nodes.last() {
            self.edges.push(WorkflowEdgeVisit {
                from: previous.id.clone(),
                to: id.clone(),
                traversed_at: at,
            });
        }
        self.nodes.push(WorkflowNodeVisit {
            id: id.clone(),
            name: name.to_string(),
            visited_at: at,
            llm_calls: Vec::new(),
        });
        id
    }

    /// Open a call record on the current visit
    pub(crate) fn start_llm_call(
        &mut self,
        system_messages: Vec<String>,
        user_messages: Vec<String>,
        at: DateTime<Utc>,
    ) -> Option<VisitId> {
        let Some(visit) = self.nodes.last_mut() else {
            warn!("start_llm_call: no node visit to attach the call to");
            return None;
        };
        if let Some(open) = visit.llm_calls.last_mut().filter(|c| c.is_open()) {
            warn!(visit = %visit.id, "start_llm_call: previous call never finished");
            open.error = Some("superseded by a newer call".to_string());
            open.completed_at = Some(at);
        }
        visit.llm_calls.push(LlmCallRecord {
            system_messages,
            user_messages,
            response: None,
            error: None,
            started_at: at,
            completed_at: None,
        });
        Some(visit.id.clone())
    }

    /// Close the open record of the current visit with `response`
    ///
    /// Without an open record a closed record with no messages is added.
    pub(crate) fn complete_llm_call(&mut self, response: String, at: DateTime<Utc>) -> Option<VisitId> {
        let visit = self.nodes.last_mut()?;
        match visit.llm_calls.last_mut().filter(|c| c.is_open()) {
            Some(open) => {
                open.response = Some(response);
                open.completed_at = Some(at);
            }
            None => {
                warn!(visit = %visit.id, "complete_llm_call: no open call, recording a closed one");
                visit.llm_calls.push(LlmCallRecord {
                    system_messages: Vec::new(),
                    user_messages: Vec::new(),
                    response: Some(response),
                    error: None,
                    started_at: at,
                    completed_at: Some(at),
                });
            }
        }
        Some(visit.id.clone())
    }

    /// Close the open record of the current visit as failed
    pub(crate) fn fail_llm_call(&mut self, error: String, at: DateTime<Utc>) -> Option<VisitId> {
        let visit = self.nodes.last_mut()?;
        let open = visit.llm_calls.last_mut().filter(|c| c.is_open())?;
        open.error = Some(error);
        open.completed_at = Some(at);
        Some(visit.id.clone())
    }

    /// Rebuild an execution from a run's persisted events
    pub fn replay<'a>(entries: impl IntoIterator<Item = &'a EventLogEntry>) -> Self {
        let mut execution = Self::default();
        for entry in entries {
            let at = entry.timestamp;
            match &entry.event {
                FlowEvent::NodeVisited { node_id, name, .. } => {
                    execution.add_visit(node_id, name, at);
                }
                FlowEvent::LlmCallStarted {
                    system_messages,
                    user_messages,
                    ..
                } => {
                    execution.start_llm_call(system_messages.clone(), user_messages.clone(), at);
                }
                FlowEvent::LlmCallCompleted { response, .. } => {
                    execution.complete_llm_call(response.clone(), at);
                }
                FlowEvent::LlmCallFailed { error, .. } => {
                    execution.fail_llm_call(error.clone(), at);
                }
                _ => {}
            }
        }
        execution
    }
}
