//! Event bus for live observability of workflow runs
//!
//! Every node visit, LLM call and gate interaction of a run is emitted on a
//! broadcast bus. The JSONL logger persists them per run; `mf trace` reads a
//! log back and rebuilds the execution with
//! [`crate::tracker::WorkflowExecution::replay`].
//!
//! ```text
//!   interpreter ─┐
//!   nodes ───────┼──► EventBus (broadcast) ──► EventLogger ─► runs/{id}/events.jsonl
//!   engine ──────┘                         └─► terminal front end
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use logger::{EventLogger, list_runs, read_run_events, spawn_event_logger};
pub use types::{EventLogEntry, FlowEvent, summarize};
