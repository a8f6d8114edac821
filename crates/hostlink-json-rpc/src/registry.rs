//! Correlation of outbound requests with inbound responses

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{RpcError, RpcResult};
use crate::types::RequestId;

/// Receiving half of a pending completion
pub type Completion = oneshot::Receiver<RpcResult<Value>>;

/// Identifier allocation plus the table of pending completions.
///
/// Each entry is created when a correlated request is sent and removed the
/// moment its response is consumed, so an identifier has at most one entry.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    next: u64,
    pending: HashMap<RequestId, oneshot::Sender<RpcResult<Value>>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier: "0", "1", "2", ...
    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::sequential(self.next);
        self.next += 1;
        id
    }

    /// Record a pending completion for `id`.
    ///
    /// Registering an identifier that is still pending is a programming error.
    pub fn register(&mut self, id: RequestId) -> Completion {
        debug_assert!(
            !self.pending.contains_key(&id),
            "identifier {} registered twice",
            id
        );
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Settle the completion for `id` with a result. Returns false when the
    /// response was orphaned.
    pub fn resolve(&mut self, id: &RequestId, result: Value) -> bool {
        self.settle(id, Ok(result))
    }

    /// Settle the completion for `id` with an error. Returns false when the
    /// response was orphaned.
    pub fn reject(&mut self, id: &RequestId, error: RpcError) -> bool {
        self.settle(id, Err(error))
    }

    /// Drop the completion for `id` without a remote outcome; the waiting
    /// caller observes [`RpcError::Cancelled`].
    pub fn cancel(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn settle(&mut self, id: &RequestId, outcome: RpcResult<Value>) -> bool {
        let Some(tx) = self.pending.remove(id) else {
            warn!(id = %id, "orphaned response: no pending call for identifier");
            return false;
        };
        if tx.send(outcome).is_err() {
            debug!(id = %id, "response arrived after the caller stopped waiting");
        }
        true
    }
}
