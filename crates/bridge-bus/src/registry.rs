//! Listener bookkeeping shared by transport endpoints.

use crate::ports::{Listener, ListenerId};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Listeners keyed by sub-channel name.
///
/// `dispatch` snapshots the listener list before invoking anything, so a
/// listener may call `add`/`remove` on the same registry without deadlocking.
pub struct ListenerRegistry<P> {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener<P>)>>>,
}

impl<P: Clone> ListenerRegistry<P> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register `listener` on `sub_channel`.
    pub fn add(&self, sub_channel: &str, listener: Listener<P>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(sub_channel.to_string())
            .or_default()
            .push((id, listener));
        trace!(sub_channel, listener_id = id.0, "Listener added");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, sub_channel: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(sub_channel) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(sub_channel);
        }
        if removed {
            trace!(sub_channel, listener_id = id.0, "Listener removed");
        }
        removed
    }

    /// Invoke every listener on `sub_channel`. Returns how many ran.
    pub fn dispatch(&self, sub_channel: &str, payload: Value, source: P) -> usize {
        let snapshot: Vec<Listener<P>> = match self.listeners.read().get(sub_channel) {
            Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
            None => return 0,
        };

        for listener in &snapshot {
            listener(payload.clone(), source.clone());
        }
        snapshot.len()
    }

    /// Number of listeners on `sub_channel`.
    pub fn listener_count(&self, sub_channel: &str) -> usize {
        self.listeners
            .read()
            .get(sub_channel)
            .map_or(0, Vec::len)
    }
}

impl<P: Clone> Default for ListenerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
