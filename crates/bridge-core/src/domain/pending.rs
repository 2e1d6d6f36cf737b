//! Pending Call Store - maps call ids to the caller waiting for the reply.
//!
//! Flow:
//! 1. `call()` asks `register()` for a fresh id and a oneshot receiver
//! 2. The call envelope goes out carrying that id
//! 3. The reply listener hands the reply envelope to `complete()`
//! 4. The caller's receiver resolves; the entry is already gone
//!
//! There is no expiry. An entry whose peer never answers stays until its
//! caller stops waiting (`AbandonOnDrop`) or `close_all()` runs, which
//! resolves every waiter with a closed channel.

use crate::domain::stats::EngineStats;
use bridge_types::{CallId, ReplyEnvelope, SerializedError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a pending call eventually receives.
pub type CallOutcome = Result<Value, SerializedError>;

/// A call waiting for its reply
struct PendingCall {
    /// Channel to hand the outcome to the caller
    sender: oneshot::Sender<CallOutcome>,
    /// Logical channel (for logging)
    channel: String,
    /// When the call was registered
    created_at: Instant,
}

/// Pending call store owned by one correlation engine.
pub struct PendingCallStore {
    pending: DashMap<CallId, PendingCall>,
    stats: Arc<EngineStats>,
}

impl PendingCallStore {
    pub fn new(stats: Arc<EngineStats>) -> Self {
        Self {
            pending: DashMap::new(),
            stats,
        }
    }

    /// Register a pending call under a fresh id.
    ///
    /// The id is guaranteed not to collide with any call still pending.
    pub fn register(&self, channel: &str) -> (CallId, oneshot::Receiver<CallOutcome>) {
        let (tx, rx) = oneshot::channel();
        let record = PendingCall {
            sender: tx,
            channel: channel.to_string(),
            created_at: Instant::now(),
        };

        loop {
            let id = CallId::new();
            match self.pending.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    debug!(call_id = %id, channel, "Registered pending call");
                    return (id, rx);
                }
                Entry::Occupied(_) => {
                    warn!(call_id = %id, "Call id collision, minting another");
                }
            }
        }
    }

    /// Settle the call a reply belongs to.
    ///
    /// Returns true if a waiting caller received the outcome.
    pub fn complete(&self, reply: ReplyEnvelope) -> bool {
        let id = reply.id;
        let Some((_, pending)) = self.pending.remove(&id) else {
            EngineStats::bump(&self.stats.replies_unmatched);
            warn!(call_id = %id, "Reply for unknown call id, ignored");
            return false;
        };

        let elapsed = pending.created_at.elapsed();
        match pending.sender.send(reply.into_result()) {
            Ok(()) => {
                EngineStats::bump(&self.stats.replies_matched);
                debug!(
                    call_id = %id,
                    channel = %pending.channel,
                    elapsed_ms = elapsed.as_millis(),
                    "Completed pending call"
                );
                true
            }
            Err(_) => {
                // Caller dropped its future before the reply came back
                EngineStats::bump(&self.stats.calls_abandoned);
                debug!(
                    call_id = %id,
                    channel = %pending.channel,
                    "Pending call receiver dropped"
                );
                false
            }
        }
    }

    /// Forget a call without settling it (used when the send itself failed).
    pub fn cancel(&self, id: &CallId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Forget a call whose caller stopped waiting.
    pub fn abandon(&self, id: &CallId) -> bool {
        let Some((_, pending)) = self.pending.remove(id) else {
            return false;
        };
        EngineStats::bump(&self.stats.calls_abandoned);
        debug!(
            call_id = %id,
            channel = %pending.channel,
            waited_ms = pending.created_at.elapsed().as_millis(),
            "Caller stopped waiting, pending call dropped"
        );
        true
    }

    /// Drop every pending call. Their waiters see a closed channel.
    pub fn close_all(&self) -> usize {
        let closed = self.pending.len();
        self.pending.clear();
        if closed > 0 {
            debug!(closed, "Closed all pending calls");
        }
        closed
    }

    /// Number of calls awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check whether an id is awaiting a reply
    pub fn is_pending(&self, id: &CallId) -> bool {
        self.pending.contains_key(id)
    }
}

/// Removes a call from the store if the caller's future is dropped before
/// the reply arrives.
pub struct AbandonOnDrop<'a> {
    store: &'a PendingCallStore,
    id: CallId,
    armed: bool,
}

impl<'a> AbandonOnDrop<'a> {
    pub fn new(store: &'a PendingCallStore, id: CallId) -> Self {
        Self {
            store,
            id,
            armed: true,
        }
    }

    /// The call settled; nothing to clean up.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.abandon(&self.id);
        }
    }
}
