//! Single-slot request/response rendezvous between a workflow and its UI

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{GateError, GateKind};
use crate::cancel::CancelToken;

/// Requests buffered while the observer is busy; with one request
/// outstanding at a time only stale requests ever fill it
const REQUEST_BUFFER: usize = 8;

/// A request as seen by the observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest<Req> {
    /// Monotonic per-gate sequence number
    pub seq: u64,
    pub payload: Req,
}

/// Stream of live requests for one gate
pub type GateRequests<Req> = BoxStream<'static, GateRequest<Req>>;

struct Stamped<Req> {
    epoch: u64,
    seq: u64,
    payload: Req,
}

type Slot<Resp> = Mutex<Option<(u64, oneshot::Sender<Resp>)>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Human-in-the-loop gate
///
/// The workflow side awaits [`Gate::request_decision`]; the UI side consumes
/// [`Gate::observe_requests`] and answers with [`Gate::submit_decision`].
/// At most one request is outstanding. A decision submitted while nothing is
/// waiting is rejected rather than kept for the next request.
pub struct Gate<Req, Resp> {
    kind: GateKind,
    request_tx: mpsc::Sender<Stamped<Req>>,
    request_rx: Mutex<Option<mpsc::Receiver<Stamped<Req>>>>,
    pending: Slot<Resp>,
    epoch: Arc<AtomicU64>,
    next_seq: AtomicU64,
}

impl<Req: Send + 'static, Resp: Send + 'static> Gate<Req, Resp> {
    pub fn new(kind: GateKind) -> Self {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
        Self {
            kind,
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            pending: Mutex::new(None),
            epoch: Arc::new(AtomicU64::new(0)),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> GateKind {
        self.kind
    }

    /// Whether a request is waiting for a decision
    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Publish `payload` to the observer and wait for the matching decision
    ///
    /// Returns [`GateError::Cancelled`] when `cancel` fires or the request is
    /// abandoned by [`Gate::cancel_pending`].
    pub async fn request_decision(&self, payload: Req, cancel: &CancelToken) -> Result<Resp, GateError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        // the epoch is read under the slot lock so a concurrent cancel_pending
        // either drops this request or sees it stamped with the new epoch
        let epoch = {
            let mut slot = lock(&self.pending);
            if slot.is_some() {
                return Err(GateError::AlreadyPending(self.kind.as_str()));
            }
            *slot = Some((seq, tx));
            self.epoch.load(Ordering::SeqCst)
        };
        debug!(gate = %self.kind, seq, epoch, "request_decision: called");
        let _guard = PendingGuard {
            slot: &self.pending,
            seq,
        };

        let request = Stamped { epoch, seq, payload };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GateError::Cancelled),
            sent = self.request_tx.send(request) => {
                sent.map_err(|_| GateError::Closed(self.kind.as_str()))?;
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(gate = %self.kind, seq, "request_decision: cancelled");
                Err(GateError::Cancelled)
            }
            decision = rx => {
                debug!(gate = %self.kind, seq, answered = decision.is_ok(), "request_decision: resolved");
                decision.map_err(|_| GateError::Cancelled)
            }
        }
    }

    /// Answer the outstanding request
    pub fn submit_decision(&self, decision: Resp) -> Result<(), GateError> {
        let pending = lock(&self.pending).take();
        match pending {
            Some((seq, tx)) => {
                debug!(gate = %self.kind, seq, "submit_decision: delivering");
                tx.send(decision)
                    .map_err(|_| GateError::NoPendingRequest(self.kind.as_str()))
            }
            None => {
                debug!(gate = %self.kind, "submit_decision: nothing pending");
                Err(GateError::NoPendingRequest(self.kind.as_str()))
            }
        }
    }

    /// Take the stream of requests; only one observer is supported
    ///
    /// Requests abandoned by [`Gate::cancel_pending`] before the observer
    /// read them are skipped.
    pub fn observe_requests(&self) -> Result<GateRequests<Req>, GateError> {
        let rx = lock(&self.request_rx)
            .take()
            .ok_or(GateError::AlreadyObserved(self.kind.as_str()))?;
        let epoch = Arc::clone(&self.epoch);
        let kind = self.kind;

        Ok(stream::unfold((rx, epoch), move |(mut rx, epoch)| async move {
            loop {
                let request = rx.recv().await?;
                if request.epoch == epoch.load(Ordering::SeqCst) {
                    let item = GateRequest {
                        seq: request.seq,
                        payload: request.payload,
                    };
                    return Some((item, (rx, epoch)));
                }
                debug!(gate = %kind, seq = request.seq, "observe_requests: skipping stale request");
            }
        })
        .boxed())
    }

    /// Abandon the outstanding request and invalidate unread ones
    pub fn cancel_pending(&self) {
        let (epoch, dropped) = {
            let mut slot = lock(&self.pending);
            (self.epoch.fetch_add(1, Ordering::SeqCst) + 1, slot.take())
        };
        debug!(gate = %self.kind, epoch, had_pending = dropped.is_some(), "cancel_pending: called");
    }
}

/// Clears the slot when the requesting future finishes or is dropped
struct PendingGuard<'a, Resp> {
    slot: &'a Slot<Resp>,
    seq: u64,
}

impl<Resp> Drop for PendingGuard<'_, Resp> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if slot.as_ref().is_some_and(|(seq, _)| *seq == self.seq) {
            *slot = None;
        }
    }
}
