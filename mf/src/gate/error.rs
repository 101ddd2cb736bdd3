//! Gate error types

use thiserror::Error;

/// Errors of the human-in-the-loop gates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The waiting request was abandoned by a reset or run cancellation
    #[error("gate request was cancelled")]
    Cancelled,

    /// A decision was submitted while no request is waiting
    #[error("{0} gate has no pending request")]
    NoPendingRequest(&'static str),

    /// A second request was issued while one is still outstanding
    #[error("{0} gate already has a pending request")]
    AlreadyPending(&'static str),

    /// Nobody observes the request stream any more
    #[error("{0} gate request stream was dropped")]
    Closed(&'static str),

    /// The request stream can be taken only once
    #[error("{0} gate requests are already being observed")]
    AlreadyObserved(&'static str),
}

impl GateError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GateError::Cancelled)
    }
}
